//! VAPID key material.
//!
//! The application server key is a P-256 keypair. The private key is held as
//! the raw 32-byte scalar and the public key as the 65-byte uncompressed SEC1
//! point (`0x04 || x || y`), both base64url-encoded in configuration.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::rand_core::OsRng;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::SecretKey;

use crate::errors::WebPushError;

pub const PUBLIC_KEY_LEN: usize = 65;
pub const PRIVATE_KEY_LEN: usize = 32;

/// Process-wide VAPID keypair plus the `sub` claim sent with every token.
///
/// Constructed once at startup and shared behind an `Arc`; never mutated.
pub struct VapidKeyPair {
    signing_key: SigningKey,
    public_key_raw: [u8; PUBLIC_KEY_LEN],
    subject: String,
}

impl VapidKeyPair {
    /// Load from base64url configuration values.
    ///
    /// The public key must be the point that belongs to the private scalar;
    /// a mismatched pair would produce tokens every push service rejects.
    pub fn from_base64url(
        public_key_b64: &str,
        private_key_b64: &str,
        subject: &str,
    ) -> Result<Self, WebPushError> {
        let public_raw = decode_base64url(public_key_b64).map_err(|e| {
            WebPushError::InvalidVapidKey(format!("public key is not base64url: {}", e))
        })?;
        let private_raw = decode_base64url(private_key_b64).map_err(|e| {
            WebPushError::InvalidVapidKey(format!("private key is not base64url: {}", e))
        })?;

        let keys = Self::from_private_key_raw(&private_raw, subject)?;
        if public_raw.as_slice() != keys.public_key_raw.as_slice() {
            return Err(WebPushError::InvalidVapidKey(
                "public key does not match private key".to_string(),
            ));
        }

        Ok(keys)
    }

    /// Build from the raw 32-byte private scalar; the public point is derived.
    pub fn from_private_key_raw(private_key: &[u8], subject: &str) -> Result<Self, WebPushError> {
        if private_key.len() != PRIVATE_KEY_LEN {
            return Err(WebPushError::InvalidVapidKey(format!(
                "private key must be a {}-byte P-256 scalar, got {} bytes",
                PRIVATE_KEY_LEN,
                private_key.len()
            )));
        }
        validate_subject(subject)?;

        let secret = SecretKey::from_slice(private_key).map_err(|_| {
            WebPushError::InvalidVapidKey("private key is not a valid P-256 scalar".to_string())
        })?;

        Ok(Self::from_secret(secret, subject))
    }

    /// Fresh random keypair. Used by tooling and tests.
    pub fn generate(subject: &str) -> Result<Self, WebPushError> {
        validate_subject(subject)?;
        Ok(Self::from_secret(SecretKey::random(&mut OsRng), subject))
    }

    fn from_secret(secret: SecretKey, subject: &str) -> Self {
        let mut public_key_raw = [0u8; PUBLIC_KEY_LEN];
        public_key_raw.copy_from_slice(secret.public_key().to_encoded_point(false).as_bytes());

        Self {
            signing_key: SigningKey::from(secret),
            public_key_raw,
            subject: subject.to_string(),
        }
    }

    pub fn public_key_raw(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.public_key_raw
    }

    /// Base64url public key, as sent in `k=` and `p256ecdsa=` and handed to
    /// browsers as `applicationServerKey`.
    pub fn public_key_base64url(&self) -> String {
        BASE64URL.encode(self.public_key_raw)
    }

    /// Base64url raw private scalar. Only for exporting generated keys.
    pub fn private_key_base64url(&self) -> String {
        BASE64URL.encode(self.signing_key.to_bytes())
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

impl std::fmt::Debug for VapidKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidKeyPair")
            .field("public_key", &self.public_key_base64url())
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

fn validate_subject(subject: &str) -> Result<(), WebPushError> {
    if subject.starts_with("mailto:") || subject.starts_with("https:") {
        Ok(())
    } else {
        Err(WebPushError::InvalidVapidKey(format!(
            "subject must be a mailto: or https: URI, got {:?}",
            subject
        )))
    }
}

/// Decode key material that browsers and tooling hand out in slightly
/// different shapes: base64url with or without padding, or standard base64.
pub fn decode_base64url(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let normalized: String = input
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    BASE64URL.decode(normalized.as_bytes())
}
