//! HTTP clients for services running as separate processes.
//!
//! Each service exposes `POST` endpoints that take an [`OrderPayload`] and
//! answer `{"message": ...}`. Transport failures are reported as
//! retryable; non-2xx answers are reported as rejections carrying the
//! service's message.

use std::time::Duration;

use async_trait::async_trait;
use common::{IDEMPOTENCY_KEY_HEADER, IdempotencyKey, MessageResponse, OrderPayload};
use serde::Serialize;
use tracing::debug;

use super::{FinalizationService, NotificationService, PaymentService, ReservationService};
use crate::error::SagaError;
use crate::order_fulfillment::{STEP_COMPENSATE_PLACE_ORDER, Step};

/// Thin JSON client bound to one service's base URL.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Posts `body` to `path` and returns the service's message.
    pub async fn post<B: Serialize + Sync>(
        &self,
        step: &str,
        path: &str,
        body: &B,
        key: &IdempotencyKey,
    ) -> Result<MessageResponse, SagaError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, %key, step, "Calling service");

        let response = self
            .client
            .post(&url)
            .header(IDEMPOTENCY_KEY_HEADER, key.as_str())
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(step, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(step, e))?;
        let message = serde_json::from_str::<MessageResponse>(&text)
            .map(|m| m.message)
            .unwrap_or(text);

        if status.is_success() {
            Ok(MessageResponse::new(message))
        } else {
            Err(SagaError::Rejected {
                step: step.to_string(),
                status: status.as_u16(),
                message,
            })
        }
    }

    fn transport_error(&self, step: &str, err: reqwest::Error) -> SagaError {
        if err.is_timeout() {
            SagaError::Timeout {
                step: step.to_string(),
                after_ms: self.timeout.as_millis() as u64,
            }
        } else {
            SagaError::DownstreamUnavailable {
                step: step.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

/// Reservation endpoints of the inventory service.
#[derive(Debug, Clone)]
pub struct HttpReservationService {
    client: HttpClient,
}

impl HttpReservationService {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReservationService for HttpReservationService {
    async fn place(&self, order: &OrderPayload, key: &IdempotencyKey) -> Result<(), SagaError> {
        self.client
            .post(Step::PlaceOrder.name(), "/placeorder", order, key)
            .await?;
        Ok(())
    }

    async fn compensate_place(
        &self,
        order: &OrderPayload,
        key: &IdempotencyKey,
    ) -> Result<(), SagaError> {
        self.client
            .post(STEP_COMPENSATE_PLACE_ORDER, "/rollback", order, key)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HttpPaymentService {
    client: HttpClient,
}

impl HttpPaymentService {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PaymentService for HttpPaymentService {
    async fn pay(&self, order: &OrderPayload, key: &IdempotencyKey) -> Result<(), SagaError> {
        self.client
            .post(Step::ProcessPayment.name(), "/payment", order, key)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HttpNotificationService {
    client: HttpClient,
}

impl HttpNotificationService {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationService for HttpNotificationService {
    async fn notify(&self, order: &OrderPayload, key: &IdempotencyKey) -> Result<(), SagaError> {
        self.client
            .post(Step::SendNotification.name(), "/notify", order, key)
            .await?;
        Ok(())
    }
}

/// Finalization endpoint of the inventory service.
#[derive(Debug, Clone)]
pub struct HttpFinalizationService {
    client: HttpClient,
}

impl HttpFinalizationService {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FinalizationService for HttpFinalizationService {
    async fn finalize(&self, order: &OrderPayload, key: &IdempotencyKey) -> Result<(), SagaError> {
        self.client
            .post(Step::FinalizeOrder.name(), "/remove", order, key)
            .await?;
        Ok(())
    }
}
