//! Finalization endpoints: decrement stock for a confirmed order and
//! restore it.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use common::{MessageResponse, OrderPayload, RestockLine};

use super::{idempotency_key, payload};
use crate::error::ApiError;
use crate::state::InventoryServices;

pub fn router(inventory: Arc<InventoryServices>) -> Router {
    Router::new()
        .route("/remove", post(remove))
        .route("/remove/rollback", post(rollback))
        .with_state(inventory)
}

/// POST /remove
#[tracing::instrument(skip_all)]
pub async fn remove(
    State(inventory): State<Arc<InventoryServices>>,
    headers: HeaderMap,
    body: Result<Json<OrderPayload>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let order = payload(body)?;
    inventory
        .finalization
        .finalize(&order, idempotency_key(&headers).as_ref())
        .await?;
    Ok(Json(MessageResponse::new("Items successfully removed from db")))
}

/// POST /remove/rollback: takes a list of lines, not an order.
#[tracing::instrument(skip_all)]
pub async fn rollback(
    State(inventory): State<Arc<InventoryServices>>,
    headers: HeaderMap,
    body: Result<Json<Vec<RestockLine>>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let lines = payload(body)?;
    inventory
        .finalization
        .compensate_finalize(&lines, idempotency_key(&headers).as_ref())
        .await?;
    Ok(Json(MessageResponse::new("Items successfully rolled back to cart")))
}
