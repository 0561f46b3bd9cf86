use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

use crate::errors::FCMError;
use crate::models::*;

pub const DEFAULT_FCM_BASE_URL: &str = "https://fcm.googleapis.com";
pub const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Cached access tokens are refreshed this long before they expire.
const TOKEN_REFRESH_SKEW_SECS: i64 = 5 * 60;

/// Firebase Cloud Messaging Client
///
/// Sends single-recipient messages through the FCM HTTP v1 API. The OAuth2
/// access token obtained from the service account is cached for the whole
/// process and shared by every send.
pub struct FCMClient {
    pub project_id: String,
    pub credentials: Arc<ServiceAccountKey>,
    token_cache: Arc<Mutex<Option<TokenCache>>>,
    /// Held across a token exchange so concurrent sends share one refresh.
    refresh_lock: Arc<tokio::sync::Mutex<()>>,
    encoding_key: EncodingKey,
    http_client: reqwest::Client,
    base_url: String,
}

impl FCMClient {
    /// Create new FCM client
    ///
    /// The private key is parsed here so a bad credential fails at startup
    /// instead of on the first send.
    pub fn new(project_id: String, credentials: ServiceAccountKey) -> Result<Self, FCMError> {
        let encoding_key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())
            .map_err(|e| FCMError::KeyParseError(e.to_string()))?;

        Ok(Self {
            project_id,
            credentials: Arc::new(credentials),
            token_cache: Arc::new(Mutex::new(None)),
            refresh_lock: Arc::new(tokio::sync::Mutex::new(())),
            encoding_key,
            http_client: reqwest::Client::new(),
            base_url: DEFAULT_FCM_BASE_URL.to_string(),
        })
    }

    pub fn with_http_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = http_client;
        self
    }

    /// Point message sends at another gateway (e.g. a mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the OAuth2 token endpoint from the service account.
    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.credentials).token_uri = token_uri.into();
        self
    }

    /// Send notification via FCM to a single device
    ///
    /// Any HTTP answer from the gateway is returned as `Ok` with its
    /// classification; `Err` means no verdict was obtained.
    pub async fn send(
        &self,
        device_token: &str,
        notification: &NativeNotification,
    ) -> Result<FCMSendResult, FCMError> {
        if !self.validate_token(device_token) {
            return Err(FCMError::InvalidToken);
        }

        let access_token = self.get_access_token().await?;
        let message = build_message(device_token, notification);
        let url = format!(
            "{}/v1/projects/{}/messages:send",
            self.base_url, self.project_id
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .json(&message)
            .send()
            .await
            .map_err(map_send_error)?;

        let http_status = response.status().as_u16();
        if response.status().is_success() {
            // Accepted is accepted; an unreadable body only loses the message id.
            let message_id = response
                .json::<FcmApiResponse>()
                .await
                .ok()
                .and_then(|r| r.name);

            return Ok(FCMSendResult {
                message_id,
                status: SendStatus::Delivered,
                http_status,
                error: None,
            });
        }

        let body = response.text().await.unwrap_or_default();
        let (status, error) = classify(http_status, &body);
        tracing::debug!(http_status, ?status, "FCM rejected message");

        Ok(FCMSendResult {
            message_id: None,
            status,
            http_status,
            error: Some(error),
        })
    }

    /// Validate device token format
    pub fn validate_token(&self, device_token: &str) -> bool {
        let len = device_token.len();
        (10..=4096).contains(&len) && !device_token.chars().any(char::is_whitespace)
    }

    /// Get access token from service account (with caching)
    pub async fn get_access_token(&self) -> Result<String, FCMError> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let _refresh = self.refresh_lock.lock().await;
        // Another send may have refreshed while we waited.
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let assertion = self.build_assertion()?;
        let params = [("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)];

        let response = self
            .http_client
            .post(&self.credentials.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| FCMError::TokenError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FCMError::TokenRequestFailed(response.status().as_u16()));
        }

        let token_response: GoogleTokenResponse = response
            .json()
            .await
            .map_err(|e| FCMError::TokenParseError(e.to_string()))?;

        let expires_at = Utc::now().timestamp() + token_response.expires_in;
        *self.token_cache.lock() = Some(TokenCache {
            access_token: token_response.access_token.clone(),
            expires_at,
        });
        tracing::info!(project_id = %self.project_id, "Obtained FCM access token");

        Ok(token_response.access_token)
    }

    fn cached_token(&self) -> Option<String> {
        let now = Utc::now().timestamp();
        self.token_cache
            .lock()
            .as_ref()
            .filter(|cached| cached.expires_at - TOKEN_REFRESH_SKEW_SECS > now)
            .map(|cached| cached.access_token.clone())
    }

    /// Signed RS256 assertion for the JWT-bearer grant.
    pub fn build_assertion(&self) -> Result<String, FCMError> {
        let now = Utc::now();
        let claims = JwtClaims {
            iss: self.credentials.client_email.clone(),
            sub: self.credentials.client_email.clone(),
            scope: FCM_SCOPE.to_string(),
            aud: self.credentials.token_uri.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.credentials.private_key_id.clone();

        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| FCMError::JwtEncodeError(e.to_string()))
    }
}

fn map_send_error(e: reqwest::Error) -> FCMError {
    if e.is_timeout() {
        FCMError::Timeout
    } else {
        FCMError::SendRequestError(e.to_string())
    }
}

/// v1 message for one device, with the delivery hints mobile clients expect.
pub fn build_message(device_token: &str, notification: &NativeNotification) -> FcmMessage {
    let (android, apns) = if notification.is_incoming_call() {
        (
            json!({
                "priority": "high",
                "notification": {
                    "sound": "ringtone",
                    "channel_id": "calls",
                    "default_vibrate_timings": false,
                    "vibrate_timings": ["0.3s", "0.1s", "0.3s", "0.1s", "0.3s"],
                },
            }),
            json!({
                "headers": { "apns-priority": "10" },
                "payload": {
                    "aps": {
                        "sound": "ringtone.caf",
                        "badge": 1,
                        "interruption-level": "critical",
                    },
                },
            }),
        )
    } else {
        (
            json!({
                "priority": "high",
                "notification": { "sound": "default" },
            }),
            json!({
                "headers": { "apns-priority": "10" },
                "payload": { "aps": { "sound": "default", "badge": 1 } },
            }),
        )
    };

    FcmMessage {
        message: FcmMessageContent {
            token: device_token.to_string(),
            notification: FcmNotification {
                title: notification.title.clone(),
                body: notification.body.clone(),
            },
            data: notification.data.clone(),
            android: Some(android),
            apns: Some(apns),
        },
    }
}

/// Map a non-2xx gateway answer to a verdict plus a short error description.
pub fn classify(http_status: u16, body: &str) -> (SendStatus, String) {
    let parsed = serde_json::from_str::<FcmErrorBody>(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|b| b.error.error_code())
        .map(str::to_string);
    let message = parsed
        .as_ref()
        .and_then(|b| b.error.message.clone())
        .unwrap_or_default();

    let status = match (http_status, code.as_deref()) {
        (404, _) | (_, Some("UNREGISTERED")) => SendStatus::Unregistered,
        (400, Some("INVALID_ARGUMENT")) if names_registration_token(&message) => {
            SendStatus::Unregistered
        }
        (429, _) | (_, Some("QUOTA_EXCEEDED")) => SendStatus::RateLimited,
        _ => SendStatus::Failed,
    };

    let error = match code {
        Some(code) => format!("{} {}", http_status, code),
        None => format!("{}", http_status),
    };
    (status, error)
}

fn names_registration_token(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("registration token") || message.contains("registration-token")
}
