use std::sync::Arc;

use fcm_shared::{FCMClient, NativeNotification, SendStatus};
use tracing::{debug, warn};

use crate::models::{DeliveryChannel, DeliveryOutcome, DeliveryStatus, NativePushToken};

pub const NOT_CONFIGURED: &str = "native push not configured";

/// Delivers to native device tokens through FCM, when configured.
#[derive(Clone, Default)]
pub struct NativePushSender {
    fcm_client: Option<Arc<FCMClient>>,
}

impl NativePushSender {
    pub fn new(fcm_client: Option<Arc<FCMClient>>) -> Self {
        Self { fcm_client }
    }

    pub fn is_configured(&self) -> bool {
        self.fcm_client.is_some()
    }

    pub async fn send(
        &self,
        token: &NativePushToken,
        notification: &NativeNotification,
    ) -> DeliveryOutcome {
        let Some(fcm) = &self.fcm_client else {
            return DeliveryOutcome::failed(
                token.id,
                token.user_id,
                DeliveryChannel::Native,
                NOT_CONFIGURED,
            );
        };

        match fcm.send(&token.token, notification).await {
            Ok(result) => {
                debug!(
                    recipient_id = %token.id,
                    channel = "native",
                    platform = token.platform.as_str(),
                    http_status = result.http_status,
                    "FCM responded"
                );
                let status = match result.status {
                    SendStatus::Delivered => DeliveryStatus::Delivered,
                    SendStatus::Unregistered => DeliveryStatus::Gone,
                    SendStatus::RateLimited => DeliveryStatus::RateLimited,
                    SendStatus::Failed => DeliveryStatus::Failed,
                };
                DeliveryOutcome::new(
                    token.id,
                    token.user_id,
                    DeliveryChannel::Native,
                    status,
                    Some(result.http_status),
                    result.error,
                )
            }
            Err(e) => {
                warn!(
                    recipient_id = %token.id,
                    channel = "native",
                    error = %e,
                    "FCM delivery failed"
                );
                DeliveryOutcome::failed(
                    token.id,
                    token.user_id,
                    DeliveryChannel::Native,
                    e.to_string(),
                )
            }
        }
    }
}
