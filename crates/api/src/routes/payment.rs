//! Payment endpoint backed by the reference payment service.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use common::{MessageResponse, OrderPayload};
use saga::PaymentService;

use super::{idempotency_key_or_fresh, payload};
use crate::error::ApiError;

pub fn router(payment: Arc<dyn PaymentService>) -> Router {
    Router::new()
        .route("/payment", post(pay))
        .with_state(payment)
}

/// POST /payment
#[tracing::instrument(skip_all)]
pub async fn pay(
    State(payment): State<Arc<dyn PaymentService>>,
    headers: HeaderMap,
    body: Result<Json<OrderPayload>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let order = payload(body)?;
    payment
        .pay(&order, &idempotency_key_or_fresh(&headers))
        .await?;
    Ok(Json(MessageResponse::new("Payment successful")))
}
