use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{NativePushToken, Platform, PushSubscription, RecipientSet};

/// Where subscriptions and device tokens live.
///
/// Delivery never writes here except to remove what a push service reported
/// as permanently gone.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn find_by_owner(&self, owner_ids: &[Uuid]) -> Result<RecipientSet>;

    async fn delete_subscriptions(&self, ids: &[Uuid]) -> Result<u64>;

    async fn delete_tokens(&self, ids: &[Uuid]) -> Result<u64>;
}

/// Postgres-backed store over `push_subscriptions` and `push_tokens`.
pub struct PgSubscriptionStore {
    db: PgPool,
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: Uuid,
    user_id: Uuid,
    token: String,
    platform: Option<String>,
}

impl PgSubscriptionStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn find_by_owner(&self, owner_ids: &[Uuid]) -> Result<RecipientSet> {
        if owner_ids.is_empty() {
            return Ok(RecipientSet::default());
        }

        let subscriptions = sqlx::query_as::<_, PushSubscription>(
            r#"
            SELECT id, user_id, endpoint, p256dh, auth
            FROM push_subscriptions
            WHERE user_id = ANY($1)
            "#,
        )
        .bind(owner_ids)
        .fetch_all(&self.db)
        .await?;

        let tokens = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT id, user_id, token, platform
            FROM push_tokens
            WHERE user_id = ANY($1)
            "#,
        )
        .bind(owner_ids)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(|row| NativePushToken {
            id: row.id,
            user_id: row.user_id,
            token: row.token,
            platform: Platform::parse(row.platform.as_deref().unwrap_or_default()),
        })
        .collect();

        Ok(RecipientSet {
            subscriptions,
            tokens,
        })
    }

    async fn delete_subscriptions(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_tokens(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM push_tokens WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Process-local store for tests and running without a database.
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    subscriptions: Mutex<Vec<PushSubscription>>,
    tokens: Mutex<Vec<NativePushToken>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_subscription(&self, subscription: PushSubscription) {
        self.subscriptions.lock().push(subscription);
    }

    pub fn add_token(&self, token: NativePushToken) {
        self.tokens.lock().push(token);
    }

    pub fn subscriptions(&self) -> Vec<PushSubscription> {
        self.subscriptions.lock().clone()
    }

    pub fn tokens(&self) -> Vec<NativePushToken> {
        self.tokens.lock().clone()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn find_by_owner(&self, owner_ids: &[Uuid]) -> Result<RecipientSet> {
        let owners: HashSet<&Uuid> = owner_ids.iter().collect();
        Ok(RecipientSet {
            subscriptions: self
                .subscriptions
                .lock()
                .iter()
                .filter(|s| owners.contains(&s.user_id))
                .cloned()
                .collect(),
            tokens: self
                .tokens
                .lock()
                .iter()
                .filter(|t| owners.contains(&t.user_id))
                .cloned()
                .collect(),
        })
    }

    async fn delete_subscriptions(&self, ids: &[Uuid]) -> Result<u64> {
        let mut subscriptions = self.subscriptions.lock();
        let before = subscriptions.len();
        subscriptions.retain(|s| !ids.contains(&s.id));
        Ok((before - subscriptions.len()) as u64)
    }

    async fn delete_tokens(&self, ids: &[Uuid]) -> Result<u64> {
        let mut tokens = self.tokens.lock();
        let before = tokens.len();
        tokens.retain(|t| !ids.contains(&t.id));
        Ok((before - tokens.len()) as u64)
    }
}
