/// HTTP handlers for the push delivery API
pub mod send_push;

use std::sync::Arc;

use actix_web::{web, HttpResponse};

use crate::metrics;
use crate::services::{Dispatcher, SubscriptionStore};

pub use send_push::send_push;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<dyn SubscriptionStore>,
    pub service_key: String,
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// Register routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/health", web::head().to(health))
        .route("/metrics", web::get().to(metrics::serve_metrics))
        .route("/functions/v1/send-push", web::post().to(send_push))
        .route("/api/v1/push/send", web::post().to(send_push));
}
