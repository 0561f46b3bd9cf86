/// FCM Shared Library
///
/// Firebase Cloud Messaging (HTTP v1) client used for native push delivery
/// to iOS and Android device tokens.
///
/// It handles:
/// - OAuth2 access tokens from a Google service account (RS256 JWT assertion)
/// - Process-wide token caching, refreshed shortly before expiry
/// - Single-recipient message delivery
/// - Classification of gateway responses (delivered, unregistered, throttled, failed)
pub mod client;
pub mod errors;
pub mod models;

pub use client::FCMClient;
pub use errors::FCMError;
pub use models::{FCMSendResult, NativeNotification, SendStatus, ServiceAccountKey};
