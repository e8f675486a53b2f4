//! Payment service trait and in-memory implementation.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use common::{IdempotencyKey, OrderPayload};
use tracing::info;

use super::{FailureMode, Fault, inject};
use crate::error::SagaError;
use crate::order_fulfillment::Step;

/// Trait for payment processing operations.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Charges the customer for the order.
    async fn pay(&self, order: &OrderPayload, key: &IdempotencyKey) -> Result<(), SagaError>;
}

#[async_trait]
impl<T: PaymentService + ?Sized> PaymentService for Arc<T> {
    async fn pay(&self, order: &OrderPayload, key: &IdempotencyKey) -> Result<(), SagaError> {
        (**self).pay(order, key).await
    }
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    calls: u32,
    charged: HashSet<String>,
    fault: Fault,
}

/// In-memory payment gateway. Charges always succeed unless a failure is
/// configured; a repeated key is charged once.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentService {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryPaymentState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures every charge to be declined.
    pub fn set_fail_on_pay(&self, fail: bool) {
        let mode = if fail { FailureMode::Reject } else { FailureMode::None };
        self.write().fault.set(mode, None);
    }

    pub fn fail_with(&self, mode: FailureMode, times: Option<u32>) {
        self.write().fault.set(mode, times);
    }

    pub fn calls(&self) -> u32 {
        self.write().calls
    }

    /// Returns the number of distinct charges made.
    pub fn payment_count(&self) -> usize {
        self.write().charged.len()
    }
}

#[async_trait]
impl PaymentService for InMemoryPaymentService {
    async fn pay(&self, order: &OrderPayload, key: &IdempotencyKey) -> Result<(), SagaError> {
        let mode = {
            let mut state = self.write();
            state.calls += 1;
            state.fault.next()
        };
        inject(mode, Step::ProcessPayment.name()).await?;

        if self.write().charged.insert(key.to_string()) {
            info!(user_id = %order.user_id, %key, "Payment successful");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::CartItem;

    use super::*;

    fn order() -> OrderPayload {
        OrderPayload::new(1, "a@b.c", vec![CartItem::new(1, 2)])
    }

    #[tokio::test]
    async fn test_pay_is_idempotent_per_key() {
        let service = InMemoryPaymentService::new();
        let key = IdempotencyKey::new("s:process_payment");

        service.pay(&order(), &key).await.unwrap();
        service.pay(&order(), &key).await.unwrap();

        assert_eq!(service.calls(), 2);
        assert_eq!(service.payment_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_on_pay() {
        let service = InMemoryPaymentService::new();
        service.set_fail_on_pay(true);

        let result = service.pay(&order(), &IdempotencyKey::new("k")).await;
        assert!(result.is_err());
        assert_eq!(service.payment_count(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_wears_off() {
        let service = InMemoryPaymentService::new();
        service.fail_with(FailureMode::Unavailable, Some(1));
        let key = IdempotencyKey::new("k");

        assert!(service.pay(&order(), &key).await.unwrap_err().is_retryable());
        service.pay(&order(), &key).await.unwrap();
        assert_eq!(service.payment_count(), 1);
    }
}
