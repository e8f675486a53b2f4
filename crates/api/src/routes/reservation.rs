//! Reservation endpoints: place an order and roll it back.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use common::{MessageResponse, OrderPayload};
use inventory::ApplyOutcome;

use super::{idempotency_key, payload};
use crate::error::ApiError;
use crate::state::InventoryServices;

pub fn router(inventory: Arc<InventoryServices>) -> Router {
    Router::new()
        .route("/placeorder", post(place))
        .route("/rollback", post(rollback))
        .with_state(inventory)
}

/// POST /placeorder: move the order's cart lines into the order journal.
#[tracing::instrument(skip_all)]
pub async fn place(
    State(inventory): State<Arc<InventoryServices>>,
    headers: HeaderMap,
    body: Result<Json<OrderPayload>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let order = payload(body)?;
    let key = idempotency_key(&headers);

    let outcome = inventory.reservation.place(&order, key.as_ref()).await?;
    if outcome == ApplyOutcome::Duplicate {
        tracing::info!(user_id = %order.user_id, "replayed place request");
    }
    Ok(Json(MessageResponse::new("Order placed successfully!")))
}

/// POST /rollback: undo a placed order.
#[tracing::instrument(skip_all)]
pub async fn rollback(
    State(inventory): State<Arc<InventoryServices>>,
    headers: HeaderMap,
    body: Result<Json<OrderPayload>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let order = payload(body)?;
    let key = idempotency_key(&headers);

    inventory
        .reservation
        .compensate_place(&order, key.as_ref())
        .await?;
    Ok(Json(MessageResponse::new("Order rolled back successfully!")))
}
