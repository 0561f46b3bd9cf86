use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::FCMError;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Firebase Service Account Key
///
/// Only the fields needed for the OAuth2 exchange are required; the rest of
/// the downloaded JSON is accepted and ignored.
#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    /// Parse the JSON credential file content.
    pub fn from_json(json: &str) -> Result<Self, FCMError> {
        let key: ServiceAccountKey = serde_json::from_str(json)
            .map_err(|e| FCMError::InvalidCredentials(e.to_string()))?;
        if key.client_email.is_empty() {
            return Err(FCMError::InvalidCredentials(
                "client_email is empty".to_string(),
            ));
        }
        if !key.private_key.contains("PRIVATE KEY") {
            return Err(FCMError::InvalidCredentials(
                "private_key is not a PEM private key".to_string(),
            ));
        }
        Ok(key)
    }
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

/// Notification handed to the client for one device token.
///
/// FCM requires `data` values to be strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NativeNotification {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

impl NativeNotification {
    pub fn is_incoming_call(&self) -> bool {
        self.data.get("type").map(String::as_str) == Some("incoming_call")
    }
}

/// Gateway verdict for one device token.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Delivered,
    /// Token will never work again and should be removed.
    Unregistered,
    /// Throttled; the caller may retry later.
    RateLimited,
    Failed,
}

/// FCM Send Result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FCMSendResult {
    pub message_id: Option<String>,
    pub status: SendStatus,
    pub http_status: u16,
    pub error: Option<String>,
}

impl FCMSendResult {
    pub fn is_success(&self) -> bool {
        self.status == SendStatus::Delivered
    }
}

/// OAuth2 Token Cache
#[derive(Debug, Clone)]
pub struct TokenCache {
    pub access_token: String,
    pub expires_at: i64,
}

/// JWT Claims for Google OAuth2
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub iss: String,
    pub sub: String,
    pub scope: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
}

/// Google OAuth2 Token Response
#[derive(Debug, Deserialize)]
pub struct GoogleTokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// FCM Message Request
#[derive(Debug, Serialize)]
pub struct FcmMessage {
    pub message: FcmMessageContent,
}

/// FCM Message Content
#[derive(Debug, Serialize)]
pub struct FcmMessageContent {
    pub token: String,
    pub notification: FcmNotification,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub android: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apns: Option<serde_json::Value>,
}

/// FCM Notification Payload
#[derive(Debug, Serialize)]
pub struct FcmNotification {
    pub title: String,
    pub body: String,
}

/// FCM API Response
#[derive(Debug, Deserialize)]
pub struct FcmApiResponse {
    pub name: Option<String>,
}

/// Error envelope returned by the v1 API
#[derive(Debug, Deserialize)]
pub struct FcmErrorBody {
    pub error: FcmErrorResponse,
}

#[derive(Debug, Deserialize)]
pub struct FcmErrorResponse {
    pub code: Option<u16>,
    pub message: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub details: Vec<FcmErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FcmErrorDetail {
    #[serde(rename = "@type")]
    pub type_url: Option<String>,
    pub error_code: Option<String>,
}

impl FcmErrorResponse {
    /// `errorCode` from the `FcmError` detail, falling back to `status`.
    pub fn error_code(&self) -> Option<&str> {
        self.details
            .iter()
            .find_map(|d| d.error_code.as_deref())
            .or(self.status.as_deref())
    }
}
