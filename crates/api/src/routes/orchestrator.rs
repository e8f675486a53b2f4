//! Orchestrator endpoints: confirm an order and inspect a saga.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use common::{OrderPayload, SagaId};
use serde::Serialize;

use super::payload;
use crate::error::ApiError;
use crate::state::Coordinator;

pub fn router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/confirmorder", post(confirm_order))
        .route("/sagas/{id}", get(saga_status))
        .with_state(coordinator)
}

#[derive(Debug, Serialize)]
pub struct ConfirmOrderResponse {
    pub message: String,
    pub saga_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct SagaStatusResponse {
    pub saga_id: String,
    pub saga_type: String,
    pub status: String,
    pub version: i64,
    pub completed_steps: Vec<String>,
    pub in_flight_step: Option<String>,
    pub failed_step: Option<String>,
    pub failure_reason: Option<String>,
    pub compensation_error: Option<String>,
}

/// POST /confirmorder: run the fulfillment saga for an order.
///
/// Answers 200 once every step succeeded and 500 naming the failed step
/// otherwise. `status` tells a clean compensation apart from
/// `COMPENSATION_FAILED`.
#[tracing::instrument(skip_all)]
pub async fn confirm_order(
    State(coordinator): State<Arc<Coordinator>>,
    body: Result<Json<OrderPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<ConfirmOrderResponse>), ApiError> {
    let order = payload(body)?;
    let outcome = coordinator.confirm_order(order).await?;

    let status = if outcome.is_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((
        status,
        Json(ConfirmOrderResponse {
            message: outcome.message().to_string(),
            saga_id: outcome.saga_id.to_string(),
            status: outcome.state.to_string(),
        }),
    ))
}

/// GET /sagas/{id}
pub async fn saga_status(
    State(coordinator): State<Arc<Coordinator>>,
    Path(id): Path<String>,
) -> Result<Json<SagaStatusResponse>, ApiError> {
    let uuid = uuid::Uuid::parse_str(&id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid saga id: {e}")))?;
    let saga_id = SagaId::from_uuid(uuid);

    let saga = coordinator
        .get_saga(saga_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Saga not found: {saga_id}")))?;

    Ok(Json(SagaStatusResponse {
        saga_id: saga_id.to_string(),
        saga_type: saga.saga_type().to_string(),
        status: saga.state().to_string(),
        version: saga.version().as_i64(),
        completed_steps: saga.completed_steps().to_vec(),
        in_flight_step: saga.in_flight().map(|(step, _)| step.to_string()),
        failed_step: saga.failed_step().map(|step| step.to_string()),
        failure_reason: saga.failure_reason().map(str::to_string),
        compensation_error: saga.compensation_error().map(str::to_string),
    }))
}
