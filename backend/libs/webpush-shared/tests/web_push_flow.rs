/// End-to-end tests for the public web push API
///
/// Covers the sequence a sender goes through for one subscription:
/// - decode subscription key material
/// - VAPID authorization for the endpoint origin
/// - aes128gcm encryption and decryption on the subscriber side
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use p256::elliptic_curve::rand_core::{OsRng, RngCore};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::SecretKey;
use webpush_shared::keys::decode_base64url;
use webpush_shared::{decrypt, encrypt, VapidAuthenticator, VapidKeyPair, WebPushError};

struct Browser {
    secret: SecretKey,
    p256dh: String,
    auth: String,
}

fn browser() -> Browser {
    let secret = SecretKey::random(&mut OsRng);
    let p256dh = BASE64URL.encode(secret.public_key().to_encoded_point(false).as_bytes());
    let mut auth = [0u8; 16];
    OsRng.fill_bytes(&mut auth);
    Browser {
        secret,
        p256dh,
        auth: BASE64URL.encode(auth),
    }
}

#[test]
fn test_subscription_receives_notification_json() {
    let keys = Arc::new(VapidKeyPair::generate("mailto:push@example.com").unwrap());
    let authenticator = VapidAuthenticator::new(keys.clone());
    let browser = browser();

    let auth = authenticator
        .authorize_endpoint("https://fcm.googleapis.com/fcm/send/dGVzdA")
        .unwrap();
    assert!(auth.authorization.starts_with("vapid t="));
    assert!(auth.authorization.ends_with(&keys.public_key_base64url()));

    let payload = serde_json::json!({"title": "Session starts", "body": "In 15 minutes"});
    let plaintext = serde_json::to_vec(&payload).unwrap();
    let body = encrypt(
        &plaintext,
        &decode_base64url(&browser.p256dh).unwrap(),
        &decode_base64url(&browser.auth).unwrap(),
    )
    .unwrap()
    .into_body();

    let received = decrypt(&body, &browser.secret, &decode_base64url(&browser.auth).unwrap()).unwrap();
    let received: serde_json::Value = serde_json::from_slice(&received).unwrap();
    assert_eq!(received, payload);
}

#[test]
fn test_wrong_auth_secret_cannot_decrypt() {
    let browser = browser();
    let body = encrypt(
        b"{}",
        &decode_base64url(&browser.p256dh).unwrap(),
        &decode_base64url(&browser.auth).unwrap(),
    )
    .unwrap()
    .into_body();

    let result = decrypt(&body, &browser.secret, &[0u8; 16]);
    assert!(matches!(result, Err(WebPushError::Decryption(_))));
}
