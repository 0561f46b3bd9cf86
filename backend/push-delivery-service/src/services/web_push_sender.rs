use std::sync::Arc;

use reqwest::StatusCode;
use tracing::{debug, warn};
use webpush_shared::keys::decode_base64url;
use webpush_shared::{encrypt, VapidAuthenticator, WebPushError};

use crate::models::{DeliveryChannel, DeliveryOutcome, DeliveryStatus, PushSubscription};
use crate::services::payload::Urgency;

/// Delivers encrypted payloads to Web Push endpoints.
pub struct WebPushSender {
    http_client: reqwest::Client,
    authenticator: Arc<VapidAuthenticator>,
    ttl_secs: u32,
}

impl WebPushSender {
    pub fn new(
        http_client: reqwest::Client,
        authenticator: Arc<VapidAuthenticator>,
        ttl_secs: u32,
    ) -> Self {
        Self {
            http_client,
            authenticator,
            ttl_secs,
        }
    }

    /// Encrypt `payload` for `subscription` and post it to its endpoint.
    pub async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &[u8],
        urgency: Urgency,
    ) -> DeliveryOutcome {
        let request = match self.prepare(subscription, payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(
                    recipient_id = %subscription.id,
                    channel = "web_push",
                    error = %e,
                    "Could not prepare web push request"
                );
                return DeliveryOutcome::failed(
                    subscription.id,
                    subscription.user_id,
                    DeliveryChannel::WebPush,
                    e.to_string(),
                );
            }
        };

        let response = self
            .http_client
            .post(&subscription.endpoint)
            .header("TTL", self.ttl_secs.to_string())
            .header("Urgency", urgency.as_str())
            .header("Content-Encoding", "aes128gcm")
            .header("Content-Type", "application/octet-stream")
            .header("Authorization", request.authorization)
            .header("Crypto-Key", request.crypto_key)
            .body(request.body)
            .send()
            .await;

        match response {
            Ok(response) => {
                let http_status = response.status();
                let status = classify(http_status);
                debug!(
                    recipient_id = %subscription.id,
                    channel = "web_push",
                    http_status = http_status.as_u16(),
                    "Push service responded"
                );
                let error = (status != DeliveryStatus::Delivered)
                    .then(|| format!("push service returned {}", http_status.as_u16()));
                DeliveryOutcome::new(
                    subscription.id,
                    subscription.user_id,
                    DeliveryChannel::WebPush,
                    status,
                    Some(http_status.as_u16()),
                    error,
                )
            }
            Err(e) => {
                warn!(
                    recipient_id = %subscription.id,
                    channel = "web_push",
                    timeout = e.is_timeout(),
                    "Web push request failed"
                );
                DeliveryOutcome::failed(
                    subscription.id,
                    subscription.user_id,
                    DeliveryChannel::WebPush,
                    format!("request failed: {}", e.without_url()),
                )
            }
        }
    }

    fn prepare(
        &self,
        subscription: &PushSubscription,
        payload: &[u8],
    ) -> Result<PreparedRequest, WebPushError> {
        let p256dh = decode_base64url(&subscription.p256dh)
            .map_err(|e| WebPushError::InvalidPublicKey(e.to_string()))?;
        let auth = decode_base64url(&subscription.auth)
            .map_err(|_| WebPushError::InvalidAuthSecret(0))?;

        let vapid = self.authenticator.authorize_endpoint(&subscription.endpoint)?;
        let encrypted = encrypt(payload, &p256dh, &auth)?;

        Ok(PreparedRequest {
            authorization: vapid.authorization,
            crypto_key: vapid.crypto_key,
            body: encrypted.into_body(),
        })
    }
}

struct PreparedRequest {
    authorization: String,
    crypto_key: String,
    body: Vec<u8>,
}

/// Push service response code to delivery status.
pub fn classify(status: StatusCode) -> DeliveryStatus {
    match status.as_u16() {
        200 | 201 | 202 => DeliveryStatus::Delivered,
        404 | 410 => DeliveryStatus::Gone,
        429 => DeliveryStatus::RateLimited,
        _ => DeliveryStatus::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_push_service_responses() {
        assert_eq!(classify(StatusCode::CREATED), DeliveryStatus::Delivered);
        assert_eq!(classify(StatusCode::OK), DeliveryStatus::Delivered);
        assert_eq!(classify(StatusCode::ACCEPTED), DeliveryStatus::Delivered);
        assert_eq!(classify(StatusCode::GONE), DeliveryStatus::Gone);
        assert_eq!(classify(StatusCode::NOT_FOUND), DeliveryStatus::Gone);
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS), DeliveryStatus::RateLimited);
        assert_eq!(classify(StatusCode::BAD_REQUEST), DeliveryStatus::Failed);
        assert_eq!(classify(StatusCode::PAYLOAD_TOO_LARGE), DeliveryStatus::Failed);
        assert_eq!(classify(StatusCode::INTERNAL_SERVER_ERROR), DeliveryStatus::Failed);
    }
}
