//! Delivery Dispatcher
//!
//! Fans one notification out to every Web Push subscription and native token
//! of its recipients and collects a per-recipient outcome for each.
//!
//! - Validation happens before any crypto or network work
//! - The payload is serialized once and encrypted per subscription
//! - In-flight sends are bounded and each one has its own timeout
//! - A failing recipient never affects its siblings
//! - Outcomes come back in input order: subscriptions first, then tokens
use std::sync::Arc;
use std::time::{Duration, Instant};

use fcm_shared::{FCMClient, NativeNotification, ServiceAccountKey};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};
use webpush_shared::ece::MAX_PLAINTEXT_LEN;
use webpush_shared::{VapidAuthenticator, VapidKeyPair};

use crate::config::{Config, DeliveryConfig, DEFAULT_NOTIFICATION_TAG};
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{
    DeliveryChannel, DeliveryOutcome, DeliveryReport, NativePushToken, NotificationRequest,
    PushSubscription, RecipientSet,
};
use crate::services::native_push::NativePushSender;
use crate::services::payload::{self, Urgency};
use crate::services::web_push_sender::WebPushSender;

enum Recipient<'a> {
    WebPush(&'a PushSubscription),
    Native(&'a NativePushToken),
}

impl Recipient<'_> {
    fn timed_out(&self, timeout: Duration) -> DeliveryOutcome {
        let message = format!("timed out after {}ms", timeout.as_millis());
        match self {
            Recipient::WebPush(s) => {
                DeliveryOutcome::failed(s.id, s.user_id, DeliveryChannel::WebPush, message)
            }
            Recipient::Native(t) => {
                DeliveryOutcome::failed(t.id, t.user_id, DeliveryChannel::Native, message)
            }
        }
    }
}

pub struct Dispatcher {
    web_push: WebPushSender,
    native: NativePushSender,
    concurrency: usize,
    request_timeout: Duration,
    default_tag: String,
}

impl Dispatcher {
    pub fn new(web_push: WebPushSender, native: NativePushSender) -> Self {
        let defaults = DeliveryConfig::default();
        Self {
            web_push,
            native,
            concurrency: defaults.concurrency,
            request_timeout: Duration::from_secs(defaults.request_timeout_secs),
            default_tag: DEFAULT_NOTIFICATION_TAG.to_string(),
        }
    }

    /// Wire up both channels from configuration.
    ///
    /// Bad VAPID or service-account material fails here, before the server
    /// accepts any request.
    pub fn from_config(config: &Config) -> Result<Self> {
        let keys = VapidKeyPair::from_base64url(
            &config.web_push.vapid_public_key,
            &config.web_push.vapid_private_key,
            &config.web_push.vapid_subject,
        )?;
        let authenticator = Arc::new(VapidAuthenticator::new(Arc::new(keys)));

        let timeout = Duration::from_secs(config.delivery.request_timeout_secs);
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(e.to_string()))?;

        let fcm_client = match &config.fcm {
            Some(fcm) => {
                let credentials = ServiceAccountKey::from_json(&fcm.service_account)?;
                let mut client = FCMClient::new(fcm.project_id.clone(), credentials)?
                    .with_http_client(http_client.clone());
                if let Some(url) = &fcm.gateway_url {
                    client = client.with_base_url(url.clone());
                }
                if let Some(uri) = &fcm.token_uri {
                    client = client.with_token_uri(uri.clone());
                }
                info!(project_id = %fcm.project_id, "Native push enabled");
                Some(Arc::new(client))
            }
            None => {
                warn!("FIREBASE_SERVICE_ACCOUNT not set, native push disabled");
                None
            }
        };

        Ok(Self::new(
            WebPushSender::new(http_client, authenticator, config.web_push.ttl_secs),
            NativePushSender::new(fcm_client),
        )
        .with_concurrency(config.delivery.concurrency)
        .with_request_timeout(timeout)
        .with_default_tag(config.web_push.default_tag.clone()))
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_default_tag(mut self, tag: impl Into<String>) -> Self {
        self.default_tag = tag.into();
        self
    }

    pub fn native_configured(&self) -> bool {
        self.native.is_configured()
    }

    /// Deliver `request` to every recipient in `recipients`.
    ///
    /// Returns `Err` only for an invalid request. Once validation passes a
    /// report is always produced, even when every recipient failed.
    pub async fn dispatch(
        &self,
        request: &NotificationRequest,
        recipients: &RecipientSet,
    ) -> Result<DeliveryReport> {
        request.validate()?;

        let web_payload = serde_json::to_vec(&payload::web_payload(request, &self.default_tag))
            .map_err(|e| AppError::Internal(e.to_string()))?;
        if web_payload.len() > MAX_PLAINTEXT_LEN && !recipients.subscriptions.is_empty() {
            return Err(AppError::Validation(format!(
                "notification payload is {} bytes, limit is {}",
                web_payload.len(),
                MAX_PLAINTEXT_LEN
            )));
        }
        let urgency = Urgency::for_request(request);
        let native_notification = payload::native_notification(request, &self.default_tag);

        let started = Instant::now();
        let jobs = recipients
            .subscriptions
            .iter()
            .map(Recipient::WebPush)
            .chain(recipients.tokens.iter().map(Recipient::Native))
            .enumerate();

        let web_payload = web_payload.as_slice();
        let native_notification = &native_notification;
        let mut indexed: Vec<(usize, DeliveryOutcome)> = stream::iter(jobs)
            .map(move |(index, recipient)| async move {
                let outcome = self
                    .deliver(&recipient, web_payload, urgency, native_notification)
                    .await;
                (index, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        indexed.sort_by_key(|(index, _)| *index);

        let outcomes: Vec<DeliveryOutcome> =
            indexed.into_iter().map(|(_, outcome)| outcome).collect();
        let elapsed = started.elapsed();
        metrics::observe_dispatch(&outcomes, elapsed);

        let report = DeliveryReport::from_outcomes(outcomes);
        info!(
            recipients = report.outcomes.len(),
            sent = report.sent(),
            failed = report.failed(),
            expired = report.expired(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Dispatch complete"
        );
        Ok(report)
    }

    async fn deliver(
        &self,
        recipient: &Recipient<'_>,
        web_payload: &[u8],
        urgency: Urgency,
        native_notification: &NativeNotification,
    ) -> DeliveryOutcome {
        let send = async {
            match recipient {
                Recipient::WebPush(subscription) => {
                    self.web_push.send(subscription, web_payload, urgency).await
                }
                Recipient::Native(token) => self.native.send(token, native_notification).await,
            }
        };

        match tokio::time::timeout(self.request_timeout, send).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let outcome = recipient.timed_out(self.request_timeout);
                warn!(
                    recipient_id = %outcome.recipient_id,
                    channel = outcome.channel.as_str(),
                    "Delivery timed out"
                );
                outcome
            }
        }
    }
}
