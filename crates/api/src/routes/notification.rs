//! Notification endpoint backed by the reference notifier.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use common::{MessageResponse, OrderPayload};
use saga::NotificationService;

use super::{idempotency_key_or_fresh, payload};
use crate::error::ApiError;

pub fn router(notification: Arc<dyn NotificationService>) -> Router {
    Router::new()
        .route("/notify", post(notify))
        .with_state(notification)
}

/// POST /notify: send the order confirmation.
#[tracing::instrument(skip_all)]
pub async fn notify(
    State(notification): State<Arc<dyn NotificationService>>,
    headers: HeaderMap,
    body: Result<Json<OrderPayload>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let order = payload(body)?;
    notification
        .notify(&order, &idempotency_key_or_fresh(&headers))
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "failed to send confirmation");
            ApiError::Internal("Failed to send email".to_string())
        })?;
    Ok(Json(MessageResponse::new("Notification sent successfully")))
}
