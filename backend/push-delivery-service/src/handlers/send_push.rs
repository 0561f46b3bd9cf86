use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use tracing::{error, info};

use super::AppState;
use crate::error::AppError;
use crate::models::NotificationRequest;

/// Send a notification to every device of the given users
///
/// POST /functions/v1/send-push
/// POST /api/v1/push/send
pub async fn send_push(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    authorize(&req, &state.service_key)?;

    let request: NotificationRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid request body: {}", e)))?;
    request.validate()?;

    let owners = request.recipients();
    let recipients = state.store.find_by_owner(&owners).await?;
    if recipients.is_empty() {
        info!(owners = owners.len(), "No push subscriptions found");
        return Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "sent": 0,
            "failed": 0,
            "message": "No subscriptions found",
        })));
    }

    let report = state.dispatcher.dispatch(&request, &recipients).await?;

    // Cleanup failures must not hide the delivery result.
    if !report.deletions.subscriptions.is_empty() {
        match state
            .store
            .delete_subscriptions(&report.deletions.subscriptions)
            .await
        {
            Ok(deleted) => info!(deleted, "Deleted expired push subscriptions"),
            Err(e) => error!(error = %e, "Failed to delete expired push subscriptions"),
        }
    }
    if !report.deletions.tokens.is_empty() {
        match state.store.delete_tokens(&report.deletions.tokens).await {
            Ok(deleted) => info!(deleted, "Deleted unregistered device tokens"),
            Err(e) => error!(error = %e, "Failed to delete unregistered device tokens"),
        }
    }

    Ok(HttpResponse::Ok().json(report.summary()))
}

fn authorize(req: &HttpRequest, service_key: &str) -> Result<(), AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AppError::Unauthorized)?;

    if service_key.is_empty() || !constant_time_eq(token.as_bytes(), service_key.as_bytes()) {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
