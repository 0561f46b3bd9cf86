use thiserror::Error;

/// Web Push error types
///
/// Key material errors surface at startup. Everything else is scoped to a
/// single subscription and is turned into a per-recipient outcome by the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WebPushError {
    #[error("Invalid VAPID key material: {0}")]
    InvalidVapidKey(String),

    #[error("Invalid subscriber public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid subscriber auth secret: expected 16 bytes, got {0}")]
    InvalidAuthSecret(usize),

    #[error("Web push payload cannot be empty")]
    EmptyPayload,

    #[error("Payload of {size} bytes exceeds the {limit} byte single-record limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Invalid push endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Failed to sign VAPID token: {0}")]
    Signing(String),

    #[error("HKDF expand failed")]
    KeyDerivation,

    #[error("AES-GCM encryption failed")]
    Encryption,

    #[error("Failed to decrypt record: {0}")]
    Decryption(String),
}

impl WebPushError {
    /// True for errors caused by the subscription's own key material.
    pub fn is_subscription_error(&self) -> bool {
        matches!(
            self,
            WebPushError::InvalidPublicKey(_)
                | WebPushError::InvalidAuthSecret(_)
                | WebPushError::InvalidEndpoint(_)
        )
    }
}

impl From<WebPushError> for String {
    fn from(err: WebPushError) -> Self {
        err.to_string()
    }
}
