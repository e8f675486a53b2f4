//! Reservation service trait and implementations.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use common::{IdempotencyKey, OrderPayload};
use inventory::{Ledger, ReservationEngine};

use super::{FailureMode, Fault, inject};
use crate::error::SagaError;
use crate::order_fulfillment::{STEP_COMPENSATE_PLACE_ORDER, Step};

/// Places orders and rolls them back.
#[async_trait]
pub trait ReservationService: Send + Sync {
    /// Moves the order's cart lines into the order journal.
    async fn place(&self, order: &OrderPayload, key: &IdempotencyKey) -> Result<(), SagaError>;

    /// Undoes [`place`](Self::place) for the order's saga.
    async fn compensate_place(
        &self,
        order: &OrderPayload,
        key: &IdempotencyKey,
    ) -> Result<(), SagaError>;
}

#[async_trait]
impl<T: ReservationService + ?Sized> ReservationService for Arc<T> {
    async fn place(&self, order: &OrderPayload, key: &IdempotencyKey) -> Result<(), SagaError> {
        (**self).place(order, key).await
    }

    async fn compensate_place(
        &self,
        order: &OrderPayload,
        key: &IdempotencyKey,
    ) -> Result<(), SagaError> {
        (**self).compensate_place(order, key).await
    }
}

/// In-process reservation against a ledger.
#[async_trait]
impl<L: Ledger> ReservationService for ReservationEngine<L> {
    async fn place(&self, order: &OrderPayload, key: &IdempotencyKey) -> Result<(), SagaError> {
        ReservationEngine::place(self, order, Some(key)).await?;
        Ok(())
    }

    async fn compensate_place(
        &self,
        order: &OrderPayload,
        key: &IdempotencyKey,
    ) -> Result<(), SagaError> {
        ReservationEngine::compensate_place(self, order, Some(key)).await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryReservationState {
    place_calls: u32,
    compensate_calls: u32,
    /// Keys of applied places not yet compensated.
    placed: HashSet<String>,
    applied_keys: HashSet<String>,
    place_fault: Fault,
    compensate_fault: Fault,
}

/// In-memory reservation service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReservationService {
    state: Arc<RwLock<InMemoryReservationState>>,
}

impl InMemoryReservationService {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryReservationState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures every place call to be rejected.
    pub fn set_fail_on_place(&self, fail: bool) {
        let mode = if fail { FailureMode::Reject } else { FailureMode::None };
        self.write().place_fault.set(mode, None);
    }

    /// Configures every compensation call to be rejected.
    pub fn set_fail_on_compensate(&self, fail: bool) {
        let mode = if fail { FailureMode::Reject } else { FailureMode::None };
        self.write().compensate_fault.set(mode, None);
    }

    /// Makes the next `times` place calls (all of them if None) fail with
    /// `mode`.
    pub fn fail_place_with(&self, mode: FailureMode, times: Option<u32>) {
        self.write().place_fault.set(mode, times);
    }

    pub fn fail_compensate_with(&self, mode: FailureMode, times: Option<u32>) {
        self.write().compensate_fault.set(mode, times);
    }

    pub fn place_calls(&self) -> u32 {
        self.write().place_calls
    }

    pub fn compensate_calls(&self) -> u32 {
        self.write().compensate_calls
    }

    /// Returns the number of orders placed and not rolled back.
    pub fn placed_count(&self) -> usize {
        self.write().placed.len()
    }
}

#[async_trait]
impl ReservationService for InMemoryReservationService {
    async fn place(&self, order: &OrderPayload, key: &IdempotencyKey) -> Result<(), SagaError> {
        order.validate()?;
        let mode = {
            let mut state = self.write();
            state.place_calls += 1;
            state.place_fault.next()
        };
        inject(mode, Step::PlaceOrder.name()).await?;

        let mut state = self.write();
        if state.applied_keys.insert(key.to_string()) {
            let saga = order.saga_id.map(|id| id.to_string()).unwrap_or_default();
            state.placed.insert(saga);
        }
        Ok(())
    }

    async fn compensate_place(
        &self,
        order: &OrderPayload,
        key: &IdempotencyKey,
    ) -> Result<(), SagaError> {
        let mode = {
            let mut state = self.write();
            state.compensate_calls += 1;
            state.compensate_fault.next()
        };
        inject(mode, STEP_COMPENSATE_PLACE_ORDER).await?;

        let mut state = self.write();
        if state.applied_keys.insert(key.to_string()) {
            let saga = order.saga_id.map(|id| id.to_string()).unwrap_or_default();
            state.placed.remove(&saga);
        }
        Ok(())
    }
}
