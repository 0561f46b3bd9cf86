#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use fcm_shared::{FCMClient, ServiceAccountKey};
use p256::elliptic_curve::rand_core::{OsRng, RngCore};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::SecretKey;
use push_delivery_service::models::{NativePushToken, Platform, PushSubscription};
use push_delivery_service::services::{Dispatcher, NativePushSender, WebPushSender};
use uuid::Uuid;
use webpush_shared::{VapidAuthenticator, VapidKeyPair};

pub const FCM_PRIVATE_KEY: &str =
    include_str!("../../../libs/fcm-shared/tests/fixtures/service_account_key.pem");

/// Browser side of a subscription: the keys needed to read what was sent.
pub struct Subscriber {
    pub secret: SecretKey,
    pub auth: [u8; 16],
    pub subscription: PushSubscription,
}

impl Subscriber {
    pub fn new(owner: Uuid, endpoint: String) -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let mut auth = [0u8; 16];
        OsRng.fill_bytes(&mut auth);
        let public = secret.public_key().to_encoded_point(false);

        let subscription = PushSubscription {
            id: Uuid::new_v4(),
            user_id: owner,
            endpoint,
            p256dh: BASE64URL.encode(public.as_bytes()),
            auth: BASE64URL.encode(auth),
        };
        Self {
            secret,
            auth,
            subscription,
        }
    }

    pub fn decrypt(&self, body: &[u8]) -> serde_json::Value {
        let plaintext = webpush_shared::decrypt(body, &self.secret, &self.auth).unwrap();
        serde_json::from_slice(&plaintext).unwrap()
    }
}

pub fn token(owner: Uuid, value: &str) -> NativePushToken {
    NativePushToken {
        id: Uuid::new_v4(),
        user_id: owner,
        token: value.to_string(),
        platform: Platform::Android,
    }
}

pub fn vapid_keys() -> Arc<VapidKeyPair> {
    Arc::new(VapidKeyPair::generate("mailto:ops@example.com").unwrap())
}

pub fn fcm_client(server_uri: &str) -> Arc<FCMClient> {
    let credentials = ServiceAccountKey {
        project_id: "test-project".to_string(),
        private_key_id: None,
        private_key: FCM_PRIVATE_KEY.to_string(),
        client_email: "push@test-project.iam.gserviceaccount.com".to_string(),
        client_id: None,
        token_uri: format!("{}/token", server_uri),
    };
    Arc::new(
        FCMClient::new("test-project".to_string(), credentials)
            .unwrap()
            .with_base_url(server_uri),
    )
}

pub fn dispatcher(fcm: Option<Arc<FCMClient>>, timeout: Duration) -> Dispatcher {
    let authenticator = Arc::new(VapidAuthenticator::new(vapid_keys()));
    Dispatcher::new(
        WebPushSender::new(reqwest::Client::new(), authenticator, 3600),
        NativePushSender::new(fcm),
    )
    .with_concurrency(4)
    .with_request_timeout(timeout)
    .with_default_tag("test-tag")
}
