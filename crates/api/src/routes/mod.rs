//! HTTP handlers, one module per service.

pub mod cart;
pub mod finalization;
pub mod health;
pub mod metrics;
pub mod notification;
pub mod orchestrator;
pub mod payment;
pub mod reservation;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use common::{IDEMPOTENCY_KEY_HEADER, IdempotencyKey};

use crate::error::ApiError;

/// Unwraps a JSON body, answering 400 with the services' usual message
/// when it does not parse.
pub(crate) fn payload<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "rejected request body");
            Err(ApiError::BadRequest("Invalid request payload".to_string()))
        }
    }
}

/// Returns the idempotency key sent with the request, if any.
pub(crate) fn idempotency_key(headers: &HeaderMap) -> Option<IdempotencyKey> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(IdempotencyKey::new)
}

/// Returns the request's idempotency key, or a fresh one for callers that
/// did not send any.
pub(crate) fn idempotency_key_or_fresh(headers: &HeaderMap) -> IdempotencyKey {
    idempotency_key(headers)
        .unwrap_or_else(|| IdempotencyKey::new(format!("request:{}", uuid::Uuid::new_v4())))
}
