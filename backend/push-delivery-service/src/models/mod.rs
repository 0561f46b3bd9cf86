use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::AppError;

pub const MAX_TITLE_CHARS: usize = 100;
pub const MAX_BODY_CHARS: usize = 500;
pub const MAX_TAG_CHARS: usize = 100;

/// Web Push subscription as registered by a browser.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PushSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub endpoint: String,
    /// Base64url uncompressed P-256 point.
    pub p256dh: String,
    /// Base64url 16-byte secret.
    pub auth: String,
}

/// Native device token registered by the mobile app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativePushToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub platform: Platform,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    Web,
}

impl Platform {
    /// Unknown values fall back to Android, the FCM default.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "ios" => Platform::Ios,
            "web" => Platform::Web,
            _ => Platform::Android,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Web => "web",
        }
    }
}

/// Everything registered for a set of owners.
#[derive(Debug, Clone, Default)]
pub struct RecipientSet {
    pub subscriptions: Vec<PushSubscription>,
    pub tokens: Vec<NativePushToken>,
}

impl RecipientSet {
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty() && self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len() + self.tokens.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushAction {
    pub action: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Inbound send request. Never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub user_ids: Option<Vec<Uuid>>,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub badge: Option<String>,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
    #[serde(default)]
    pub actions: Option<Vec<PushAction>>,
}

impl NotificationRequest {
    /// `userId` followed by `userIds`, first occurrence wins.
    pub fn recipients(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = Vec::new();
        for id in self.user_id.iter().chain(self.user_ids.iter().flatten()) {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.recipients().is_empty() {
            return Err(AppError::Validation(
                "userId or userIds required".to_string(),
            ));
        }
        check_length("title", &self.title, 1, MAX_TITLE_CHARS)?;
        check_length("body", &self.body, 1, MAX_BODY_CHARS)?;
        if let Some(tag) = &self.tag {
            check_length("tag", tag, 0, MAX_TAG_CHARS)?;
        }
        if let Some(actions) = &self.actions {
            if actions
                .iter()
                .any(|a| a.action.trim().is_empty() || a.title.trim().is_empty())
            {
                return Err(AppError::Validation(
                    "actions require an action and a title".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// The `data.type` field, used to flag incoming calls.
    pub fn notification_type(&self) -> Option<&str> {
        self.data.as_ref()?.get("type")?.as_str()
    }

    pub fn is_incoming_call(&self) -> bool {
        self.notification_type() == Some("incoming_call")
    }
}

fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), AppError> {
    let len = value.chars().count();
    if min > 0 && value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    if len < min || len > max {
        return Err(AppError::Validation(format!(
            "{} must be between {} and {} characters",
            field, min, max
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    WebPush,
    Native,
}

impl DeliveryChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryChannel::WebPush => "web_push",
            DeliveryChannel::Native => "native",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    /// Subscription or token is permanently invalid.
    Gone,
    RateLimited,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Gone => "gone",
            DeliveryStatus::RateLimited => "rate_limited",
            DeliveryStatus::Failed => "failed",
        }
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    /// Subscription or token id.
    pub recipient_id: Uuid,
    pub owner_id: Uuid,
    pub channel: DeliveryChannel,
    pub status: DeliveryStatus,
    pub http_status: Option<u16>,
    pub should_delete: bool,
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn new(
        recipient_id: Uuid,
        owner_id: Uuid,
        channel: DeliveryChannel,
        status: DeliveryStatus,
        http_status: Option<u16>,
        error: Option<String>,
    ) -> Self {
        Self {
            recipient_id,
            owner_id,
            channel,
            status,
            http_status,
            should_delete: status == DeliveryStatus::Gone,
            error,
        }
    }

    pub fn failed(
        recipient_id: Uuid,
        owner_id: Uuid,
        channel: DeliveryChannel,
        error: impl Into<String>,
    ) -> Self {
        Self::new(
            recipient_id,
            owner_id,
            channel,
            DeliveryStatus::Failed,
            None,
            Some(error.into()),
        )
    }
}

/// Ids the subscription store should remove.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Deletions {
    pub subscriptions: Vec<Uuid>,
    pub tokens: Vec<Uuid>,
}

impl Deletions {
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty() && self.tokens.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub outcomes: Vec<DeliveryOutcome>,
    pub deletions: Deletions,
}

impl DeliveryReport {
    pub fn from_outcomes(outcomes: Vec<DeliveryOutcome>) -> Self {
        let mut deletions = Deletions::default();
        for outcome in outcomes.iter().filter(|o| o.should_delete) {
            match outcome.channel {
                DeliveryChannel::WebPush => deletions.subscriptions.push(outcome.recipient_id),
                DeliveryChannel::Native => deletions.tokens.push(outcome.recipient_id),
            }
        }
        Self {
            outcomes,
            deletions,
        }
    }

    pub fn channel_summary(&self, channel: DeliveryChannel) -> ChannelSummary {
        let mut summary = ChannelSummary::default();
        for outcome in self.outcomes.iter().filter(|o| o.channel == channel) {
            match outcome.status {
                DeliveryStatus::Delivered => summary.sent += 1,
                DeliveryStatus::Gone => {
                    summary.failed += 1;
                    summary.expired += 1;
                }
                DeliveryStatus::RateLimited | DeliveryStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }

    pub fn sent(&self) -> usize {
        self.count(DeliveryStatus::Delivered)
    }

    /// Every recipient that did not get the message, expired ones included.
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.sent()
    }

    pub fn expired(&self) -> usize {
        self.count(DeliveryStatus::Gone)
    }

    fn count(&self, status: DeliveryStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn summary(&self) -> DeliverySummary {
        DeliverySummary {
            success: true,
            sent: self.sent(),
            failed: self.failed(),
            expired: self.expired(),
            breakdown: Breakdown {
                web: self.channel_summary(DeliveryChannel::WebPush),
                native: self.channel_summary(DeliveryChannel::Native),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelSummary {
    pub sent: usize,
    pub failed: usize,
    pub expired: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Breakdown {
    pub web: ChannelSummary,
    pub native: ChannelSummary,
}

/// Response body of the send endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliverySummary {
    pub success: bool,
    pub sent: usize,
    pub failed: usize,
    pub expired: usize,
    pub breakdown: Breakdown,
}
