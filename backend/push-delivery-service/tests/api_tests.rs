/// Integration tests for the push delivery HTTP API
///
/// This test module covers:
/// - Bearer authentication on the send endpoints
/// - Request validation and error response format
/// - The no-subscription short circuit
/// - Delivery summary and deletion forwarding to the store
/// - Health and metrics endpoints
mod common;

use std::sync::Arc;
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use push_delivery_service::models::DeliverySummary;
use push_delivery_service::services::InMemorySubscriptionStore;
use push_delivery_service::{register_routes, AppState};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{dispatcher, Subscriber};

const SERVICE_KEY: &str = "test-service-key";

fn state(store: Arc<InMemorySubscriptionStore>) -> AppState {
    AppState {
        dispatcher: Arc::new(dispatcher(None, Duration::from_secs(5))),
        store,
        service_key: SERVICE_KEY.to_string(),
    }
}

macro_rules! app {
    ($store:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(state($store)))
                .configure(register_routes),
        )
        .await
    };
}

fn send_request(body: Value) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/functions/v1/send-push")
        .insert_header(("Authorization", format!("Bearer {}", SERVICE_KEY)))
        .set_json(body)
}

#[actix_web::test]
async fn test_missing_bearer_is_unauthorized() {
    let app = app!(Arc::new(InMemorySubscriptionStore::new()));

    let req = test::TestRequest::post()
        .uri("/functions/v1/send-push")
        .set_json(json!({"userId": Uuid::new_v4(), "title": "t", "body": "b"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/api/v1/push/send")
        .insert_header(("Authorization", "Bearer wrong-key"))
        .set_json(json!({"userId": Uuid::new_v4(), "title": "t", "body": "b"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_validation_errors_are_bad_request() {
    let app = app!(Arc::new(InMemorySubscriptionStore::new()));

    let cases = vec![
        json!({"userId": Uuid::new_v4(), "title": "", "body": "b"}),
        json!({"userId": Uuid::new_v4(), "title": "t".repeat(101), "body": "b"}),
        json!({"userId": Uuid::new_v4(), "title": "t", "body": "b".repeat(501)}),
        json!({"userId": "not-a-uuid", "title": "t", "body": "b"}),
        json!({"title": "t", "body": "b"}),
        json!({"userIds": [], "title": "t", "body": "b"}),
    ];
    for body in cases {
        let resp = test::call_service(&app, send_request(body.clone()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body: {}", body);
        let error: Value = test::read_body_json(resp).await;
        assert!(error["error"].is_string());
        assert_eq!(error["code"], 400);
    }
}

#[actix_web::test]
async fn test_invalid_json_is_bad_request() {
    let app = app!(Arc::new(InMemorySubscriptionStore::new()));

    let req = test::TestRequest::post()
        .uri("/functions/v1/send-push")
        .insert_header(("Authorization", format!("Bearer {}", SERVICE_KEY)))
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_no_subscriptions_found() {
    let app = app!(Arc::new(InMemorySubscriptionStore::new()));

    let req = send_request(json!({
        "userId": Uuid::new_v4(),
        "title": "Hello",
        "body": "World",
    }))
    .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(
        body,
        json!({"success": true, "sent": 0, "failed": 0, "message": "No subscriptions found"})
    );
}

#[actix_web::test]
async fn test_send_reports_summary_and_removes_gone_subscriptions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/push/live"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/push/expired"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let owner = Uuid::new_v4();
    let other = Uuid::new_v4();
    let live = Subscriber::new(owner, format!("{}/push/live", server.uri()));
    let expired = Subscriber::new(other, format!("{}/push/expired", server.uri()));

    let store = Arc::new(InMemorySubscriptionStore::new());
    store.add_subscription(live.subscription.clone());
    store.add_subscription(expired.subscription.clone());
    let app = app!(store.clone());

    let req = send_request(json!({
        "userId": owner,
        "userIds": [other],
        "title": "Squad update",
        "body": "Session moved to 21:00",
        "tag": "session-update",
    }))
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let summary: DeliverySummary = test::read_body_json(resp).await;
    assert!(summary.success);
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.expired, 1);
    assert_eq!(summary.breakdown.web.expired, 1);
    assert_eq!(summary.breakdown.native.sent, 0);

    let remaining: Vec<Uuid> = store.subscriptions().iter().map(|s| s.id).collect();
    assert_eq!(remaining, vec![live.subscription.id]);
}

#[actix_web::test]
async fn test_health_and_metrics() {
    let app = app!(Arc::new(InMemorySubscriptionStore::new()));

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::default()
        .method(actix_web::http::Method::HEAD)
        .uri("/health")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}
