//! `aes128gcm` content encoding for Web Push payloads (RFC 8291 over RFC 8188).
//!
//! Every call to [`encrypt`] generates its own ephemeral P-256 keypair and
//! salt; nothing is cached or reused between messages or recipients.
//!
//! Wire layout of the request body:
//!
//! ```text
//! salt (16) | rs (4, big-endian) | idlen (1) = 65 | server public key (65) | ciphertext + tag
//! ```

use aes_gcm::aead::Aead;
use aes_gcm::{Aes128Gcm, KeyInit, Nonce};
use hkdf::Hkdf;
use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::rand_core::{OsRng, RngCore};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use sha2::Sha256;

use crate::errors::WebPushError;
use crate::keys::PUBLIC_KEY_LEN;

pub const SALT_LEN: usize = 16;
pub const AUTH_SECRET_LEN: usize = 16;
pub const TAG_LEN: usize = 16;
/// salt + rs + idlen + keyid
pub const HEADER_LEN: usize = SALT_LEN + 4 + 1 + PUBLIC_KEY_LEN;
/// Push services are only required to accept bodies up to this size.
pub const MAX_BODY_LEN: usize = 4096;
/// Largest plaintext (plus deliberate padding) that still fits one record.
pub const MAX_PLAINTEXT_LEN: usize = MAX_BODY_LEN - HEADER_LEN - TAG_LEN - 1;

const CEK_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const IKM_LEN: usize = 32;

const WEBPUSH_INFO: &[u8] = b"WebPush: info\0";
const CEK_INFO: &[u8] = b"Content-Encoding: aes128gcm\0";
const NONCE_INFO: &[u8] = b"Content-Encoding: nonce\0";

/// Final-record delimiter from RFC 8188 section 2.
const LAST_RECORD_DELIMITER: u8 = 0x02;

/// The `aes128gcm` coding header that precedes the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub salt: [u8; SALT_LEN],
    pub record_size: u32,
    pub server_public_key: [u8; PUBLIC_KEY_LEN],
}

impl RecordHeader {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.record_size.to_be_bytes());
        out.push(PUBLIC_KEY_LEN as u8);
        out.extend_from_slice(&self.server_public_key);
        out
    }

    /// Split a request body into its header and the encrypted record.
    pub fn parse(body: &[u8]) -> Result<(Self, &[u8]), WebPushError> {
        if body.len() < HEADER_LEN {
            return Err(WebPushError::Decryption(format!(
                "body of {} bytes is shorter than the {} byte header",
                body.len(),
                HEADER_LEN
            )));
        }
        if body[SALT_LEN + 4] as usize != PUBLIC_KEY_LEN {
            return Err(WebPushError::Decryption(format!(
                "unexpected key id length {}",
                body[SALT_LEN + 4]
            )));
        }

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&body[..SALT_LEN]);
        let mut rs = [0u8; 4];
        rs.copy_from_slice(&body[SALT_LEN..SALT_LEN + 4]);
        let mut server_public_key = [0u8; PUBLIC_KEY_LEN];
        server_public_key.copy_from_slice(&body[SALT_LEN + 5..HEADER_LEN]);

        Ok((
            Self {
                salt,
                record_size: u32::from_be_bytes(rs),
                server_public_key,
            },
            &body[HEADER_LEN..],
        ))
    }
}

/// Encrypted Web Push message: coding header plus one AES-GCM record.
#[derive(Debug, Clone)]
pub struct EncryptedPayload {
    pub header: RecordHeader,
    /// Ciphertext with the 16-byte GCM tag appended.
    pub ciphertext: Vec<u8>,
}

impl EncryptedPayload {
    pub fn body_len(&self) -> usize {
        HEADER_LEN + self.ciphertext.len()
    }

    /// The HTTP request body sent to the push service.
    pub fn into_body(self) -> Vec<u8> {
        let mut body = self.header.to_bytes();
        body.extend_from_slice(&self.ciphertext);
        body
    }
}

/// Encrypt `plaintext` for one subscription.
///
/// `subscriber_public_key` is the subscription's `p256dh` (65-byte uncompressed
/// point) and `auth_secret` its 16-byte `auth` value, both already decoded.
pub fn encrypt(
    plaintext: &[u8],
    subscriber_public_key: &[u8],
    auth_secret: &[u8],
) -> Result<EncryptedPayload, WebPushError> {
    encrypt_with_padding(plaintext, subscriber_public_key, auth_secret, 0)
}

/// Like [`encrypt`], appending `padding` zero octets after the delimiter to
/// hide the plaintext length.
pub fn encrypt_with_padding(
    plaintext: &[u8],
    subscriber_public_key: &[u8],
    auth_secret: &[u8],
    padding: usize,
) -> Result<EncryptedPayload, WebPushError> {
    let (ua_public, ua_public_raw) = parse_subscriber_key(subscriber_public_key)?;
    let auth_secret = parse_auth_secret(auth_secret)?;

    let ephemeral = SecretKey::random(&mut OsRng);
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    encrypt_record(
        plaintext,
        padding,
        &ua_public,
        &ua_public_raw,
        &auth_secret,
        &ephemeral,
        salt,
    )
}

fn encrypt_record(
    plaintext: &[u8],
    padding: usize,
    ua_public: &PublicKey,
    ua_public_raw: &[u8; PUBLIC_KEY_LEN],
    auth_secret: &[u8; AUTH_SECRET_LEN],
    ephemeral: &SecretKey,
    salt: [u8; SALT_LEN],
) -> Result<EncryptedPayload, WebPushError> {
    if plaintext.is_empty() {
        return Err(WebPushError::EmptyPayload);
    }
    let size = plaintext.len().saturating_add(padding);
    if size > MAX_PLAINTEXT_LEN {
        return Err(WebPushError::PayloadTooLarge {
            size,
            limit: MAX_PLAINTEXT_LEN,
        });
    }

    let mut as_public_raw = [0u8; PUBLIC_KEY_LEN];
    as_public_raw.copy_from_slice(ephemeral.public_key().to_encoded_point(false).as_bytes());

    let shared = diffie_hellman(ephemeral.to_nonzero_scalar(), ua_public.as_affine());
    let (cek, nonce) = derive_content_keys(
        shared.raw_secret_bytes().as_slice(),
        auth_secret,
        ua_public_raw,
        &as_public_raw,
        &salt,
    )?;

    let mut record = Vec::with_capacity(size + 1);
    record.extend_from_slice(plaintext);
    record.push(LAST_RECORD_DELIMITER);
    record.resize(size + 1, 0);

    let cipher = Aes128Gcm::new_from_slice(&cek).map_err(|_| WebPushError::Encryption)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), record.as_slice())
        .map_err(|_| WebPushError::Encryption)?;

    Ok(EncryptedPayload {
        header: RecordHeader {
            salt,
            record_size: ciphertext.len() as u32,
            server_public_key: as_public_raw,
        },
        ciphertext,
    })
}

/// Decrypt a single-record `aes128gcm` body as the user agent would.
///
/// The push path never calls this; it exists so delivery can be verified end
/// to end against a subscriber keypair.
pub fn decrypt(
    body: &[u8],
    subscriber_private_key: &SecretKey,
    auth_secret: &[u8],
) -> Result<Vec<u8>, WebPushError> {
    let auth_secret = parse_auth_secret(auth_secret)?;
    let (header, record) = RecordHeader::parse(body)?;
    if record.len() > header.record_size as usize {
        return Err(WebPushError::Decryption(format!(
            "record of {} bytes exceeds rs {}",
            record.len(),
            header.record_size
        )));
    }

    let as_public = PublicKey::from_sec1_bytes(&header.server_public_key)
        .map_err(|_| WebPushError::Decryption("server key is not on the curve".to_string()))?;
    let mut ua_public_raw = [0u8; PUBLIC_KEY_LEN];
    ua_public_raw.copy_from_slice(
        subscriber_private_key
            .public_key()
            .to_encoded_point(false)
            .as_bytes(),
    );

    let shared = diffie_hellman(
        subscriber_private_key.to_nonzero_scalar(),
        as_public.as_affine(),
    );
    let (cek, nonce) = derive_content_keys(
        shared.raw_secret_bytes().as_slice(),
        &auth_secret,
        &ua_public_raw,
        &header.server_public_key,
        &header.salt,
    )?;

    let cipher = Aes128Gcm::new_from_slice(&cek).map_err(|_| WebPushError::Encryption)?;
    let mut padded = cipher
        .decrypt(Nonce::from_slice(&nonce), record)
        .map_err(|_| WebPushError::Decryption("authentication tag mismatch".to_string()))?;

    while padded.last() == Some(&0) {
        padded.pop();
    }
    match padded.pop() {
        Some(LAST_RECORD_DELIMITER) => Ok(padded),
        _ => Err(WebPushError::Decryption(
            "missing final record delimiter".to_string(),
        )),
    }
}

fn derive_content_keys(
    ecdh_secret: &[u8],
    auth_secret: &[u8; AUTH_SECRET_LEN],
    ua_public_raw: &[u8; PUBLIC_KEY_LEN],
    as_public_raw: &[u8; PUBLIC_KEY_LEN],
    salt: &[u8; SALT_LEN],
) -> Result<([u8; CEK_LEN], [u8; NONCE_LEN]), WebPushError> {
    let mut key_info = Vec::with_capacity(WEBPUSH_INFO.len() + 2 * PUBLIC_KEY_LEN);
    key_info.extend_from_slice(WEBPUSH_INFO);
    key_info.extend_from_slice(ua_public_raw);
    key_info.extend_from_slice(as_public_raw);

    let mut ikm = [0u8; IKM_LEN];
    Hkdf::<Sha256>::new(Some(auth_secret), ecdh_secret)
        .expand(&key_info, &mut ikm)
        .map_err(|_| WebPushError::KeyDerivation)?;

    let prk = Hkdf::<Sha256>::new(Some(salt), &ikm);
    let mut cek = [0u8; CEK_LEN];
    prk.expand(CEK_INFO, &mut cek)
        .map_err(|_| WebPushError::KeyDerivation)?;
    let mut nonce = [0u8; NONCE_LEN];
    prk.expand(NONCE_INFO, &mut nonce)
        .map_err(|_| WebPushError::KeyDerivation)?;

    Ok((cek, nonce))
}

fn parse_subscriber_key(raw: &[u8]) -> Result<(PublicKey, [u8; PUBLIC_KEY_LEN]), WebPushError> {
    if raw.len() != PUBLIC_KEY_LEN || raw[0] != 0x04 {
        return Err(WebPushError::InvalidPublicKey(format!(
            "expected a {}-byte uncompressed P-256 point, got {} bytes",
            PUBLIC_KEY_LEN,
            raw.len()
        )));
    }
    let public = PublicKey::from_sec1_bytes(raw)
        .map_err(|_| WebPushError::InvalidPublicKey("point is not on the P-256 curve".to_string()))?;

    let mut out = [0u8; PUBLIC_KEY_LEN];
    out.copy_from_slice(raw);
    Ok((public, out))
}

fn parse_auth_secret(raw: &[u8]) -> Result<[u8; AUTH_SECRET_LEN], WebPushError> {
    raw.try_into()
        .map_err(|_| WebPushError::InvalidAuthSecret(raw.len()))
}
