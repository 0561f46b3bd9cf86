//! Web Push shared library
//!
//! Implements the server side of the standardized Web Push protocol:
//!
//! - VAPID key material (P-256) loaded once and shared read-only
//! - VAPID authorization tokens (RFC 8292), cached per push-service origin
//! - `aes128gcm` payload encryption (RFC 8291 / RFC 8188)
//!
//! HTTP delivery is left to the caller; this crate produces header values and
//! the encrypted request body.

pub mod ece;
pub mod errors;
pub mod keys;
pub mod vapid;

pub use ece::{decrypt, encrypt, encrypt_with_padding, EncryptedPayload, RecordHeader};
pub use errors::WebPushError;
pub use keys::VapidKeyPair;
pub use vapid::{audience_for, authorize, VapidAuthenticator, VapidAuthorization};
