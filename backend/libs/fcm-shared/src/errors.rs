use thiserror::Error;

/// FCM Client Error Types
///
/// These cover failures before a gateway verdict exists. A response from the
/// send endpoint, successful or not, is reported through `FCMSendResult`.
#[derive(Error, Debug)]
pub enum FCMError {
    #[error("Invalid service account credentials: {0}")]
    InvalidCredentials(String),

    #[error("Failed to parse private key: {0}")]
    KeyParseError(String),

    #[error("Failed to encode JWT: {0}")]
    JwtEncodeError(String),

    #[error("Failed to get access token: {0}")]
    TokenError(String),

    #[error("Token request failed with status: {0}")]
    TokenRequestFailed(u16),

    #[error("Failed to parse token response: {0}")]
    TokenParseError(String),

    #[error("FCM send request failed: {0}")]
    SendRequestError(String),

    #[error("FCM request timed out")]
    Timeout,

    #[error("Invalid device token")]
    InvalidToken,
}

impl From<FCMError> for String {
    fn from(err: FCMError) -> Self {
        err.to_string()
    }
}
