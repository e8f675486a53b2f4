//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::MessageResponse;
use inventory::InventoryError;
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
///
/// Every error answers with the `{"message": ...}` body the services use
/// for success too.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    /// Inventory engine error.
    Inventory(InventoryError),
    /// Saga or step service error.
    Saga(SagaError),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Inventory(err) => inventory_error_to_response(err),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, axum::Json(MessageResponse::new(message))).into_response()
    }
}

fn inventory_error_to_response(err: InventoryError) -> (StatusCode, String) {
    if err.is_client_error() {
        let message = match &err {
            InventoryError::Validation(e) => e.to_string(),
            other => other.to_string(),
        };
        return (StatusCode::BAD_REQUEST, message);
    }

    match &err {
        InventoryError::ProductNotFound(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Product not found".to_string())
        }
        _ => {
            tracing::error!(error = %err, "inventory transaction failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    match &err {
        SagaError::Validation(e) => (StatusCode::BAD_REQUEST, e.to_string()),
        SagaError::InsufficientStock(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        SagaError::SagaNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        SagaError::InvalidState { .. } => (StatusCode::CONFLICT, err.to_string()),
        SagaError::Rejected { message, .. } => (StatusCode::INTERNAL_SERVER_ERROR, message.clone()),
        _ => {
            tracing::error!(error = %err, "saga error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Inventory(err)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}
