//! VAPID authorization (RFC 8292).
//!
//! A token is bound to one push-service origin, so a batch only signs once
//! per distinct origin. [`VapidAuthenticator`] keeps those tokens in a
//! concurrent map until shortly before they expire.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use chrono::Utc;
use dashmap::DashMap;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::Signature;
use serde::Serialize;
use url::{Host, Url};

use crate::errors::WebPushError;
use crate::keys::VapidKeyPair;

/// Token lifetime. RFC 8292 caps `exp` at 24 hours.
pub const VAPID_TOKEN_TTL_SECS: i64 = 12 * 60 * 60;
/// Cached tokens are re-signed this long before they expire.
const VAPID_REFRESH_SKEW_SECS: i64 = 60;
const DEFAULT_CACHE_CAPACITY: usize = 1024;

#[derive(Serialize)]
struct JwtHeader {
    typ: &'static str,
    alg: &'static str,
}

#[derive(Serialize)]
struct VapidClaims<'a> {
    aud: &'a str,
    exp: i64,
    sub: &'a str,
}

/// Header values proving the server's identity to one push-service origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VapidAuthorization {
    pub token: String,
    /// `vapid t=<jwt>, k=<public key>`
    pub authorization: String,
    /// `p256ecdsa=<public key>`, still read by older push services.
    pub crypto_key: String,
    /// Unix seconds.
    pub expires_at: i64,
}

/// Origin (`scheme://host[:port]`) of a push endpoint, used as the JWT `aud`.
pub fn audience_for(endpoint: &str) -> Result<String, WebPushError> {
    let url = Url::parse(endpoint).map_err(|e| WebPushError::InvalidEndpoint(e.to_string()))?;
    if !matches!(url.scheme(), "https" | "http") {
        return Err(WebPushError::InvalidEndpoint(format!(
            "unsupported scheme {}",
            url.scheme()
        )));
    }
    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => format!("[{}]", ip),
        None => return Err(WebPushError::InvalidEndpoint("missing host".to_string())),
    };

    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

/// Sign a fresh VAPID token for `audience`.
pub fn authorize(audience: &str, keys: &VapidKeyPair) -> Result<VapidAuthorization, WebPushError> {
    authorize_at(audience, keys, Utc::now().timestamp())
}

fn authorize_at(
    audience: &str,
    keys: &VapidKeyPair,
    now: i64,
) -> Result<VapidAuthorization, WebPushError> {
    let expires_at = now + VAPID_TOKEN_TTL_SECS;
    let header = serde_json::to_vec(&JwtHeader {
        typ: "JWT",
        alg: "ES256",
    })
    .map_err(|e| WebPushError::Signing(e.to_string()))?;
    let claims = serde_json::to_vec(&VapidClaims {
        aud: audience,
        exp: expires_at,
        sub: keys.subject(),
    })
    .map_err(|e| WebPushError::Signing(e.to_string()))?;

    let signing_input = format!("{}.{}", BASE64URL.encode(header), BASE64URL.encode(claims));
    let signature: Signature = keys
        .signing_key()
        .try_sign(signing_input.as_bytes())
        .map_err(|e| WebPushError::Signing(e.to_string()))?;
    // JWS wants the fixed-width r || s form, not DER.
    let token = format!(
        "{}.{}",
        signing_input,
        BASE64URL.encode(signature.to_bytes())
    );

    let public_key = keys.public_key_base64url();
    Ok(VapidAuthorization {
        authorization: format!("vapid t={}, k={}", token, public_key),
        crypto_key: format!("p256ecdsa={}", public_key),
        token,
        expires_at,
    })
}

/// VAPID signer with a per-origin token cache.
///
/// Cheap to share behind an `Arc`; the map shards its own locks and no lock is
/// held while signing or by callers during network I/O.
pub struct VapidAuthenticator {
    keys: Arc<VapidKeyPair>,
    cache: DashMap<String, VapidAuthorization>,
    capacity: usize,
}

impl VapidAuthenticator {
    pub fn new(keys: Arc<VapidKeyPair>) -> Self {
        Self::with_capacity(keys, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(keys: Arc<VapidKeyPair>, capacity: usize) -> Self {
        Self {
            keys,
            cache: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn keys(&self) -> &VapidKeyPair {
        &self.keys
    }

    /// Authorization for the origin of `endpoint`.
    pub fn authorize_endpoint(&self, endpoint: &str) -> Result<VapidAuthorization, WebPushError> {
        let audience = audience_for(endpoint)?;
        self.authorize(&audience)
    }

    /// Cached authorization for `audience`, signing a new token when the
    /// cached one is missing or about to expire.
    pub fn authorize(&self, audience: &str) -> Result<VapidAuthorization, WebPushError> {
        let now = Utc::now().timestamp();
        if let Some(entry) = self.cache.get(audience) {
            if entry.expires_at - VAPID_REFRESH_SKEW_SECS > now {
                return Ok(entry.clone());
            }
        }

        let fresh = authorize_at(audience, &self.keys, now)?;
        if self.cache.len() >= self.capacity {
            self.evict(now);
        }
        self.cache.insert(audience.to_string(), fresh.clone());
        tracing::debug!(audience = %audience, "Signed VAPID token");
        Ok(fresh)
    }

    pub fn cached_origins(&self) -> usize {
        self.cache.len()
    }

    fn evict(&self, now: i64) {
        self.cache
            .retain(|_, entry| entry.expires_at - VAPID_REFRESH_SKEW_SECS > now);
        if self.cache.len() < self.capacity {
            return;
        }
        let soonest = self
            .cache
            .iter()
            .min_by_key(|entry| entry.expires_at)
            .map(|entry| entry.key().clone());
        if let Some(origin) = soonest {
            self.cache.remove(&origin);
        }
    }
}
