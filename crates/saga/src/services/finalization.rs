//! Finalization service trait and implementations.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use common::{IdempotencyKey, OrderPayload};
use inventory::{FinalizationEngine, Ledger};

use super::{FailureMode, Fault, inject};
use crate::error::SagaError;
use crate::order_fulfillment::Step;

/// Decrements stock for a confirmed order.
#[async_trait]
pub trait FinalizationService: Send + Sync {
    async fn finalize(&self, order: &OrderPayload, key: &IdempotencyKey) -> Result<(), SagaError>;
}

#[async_trait]
impl<T: FinalizationService + ?Sized> FinalizationService for Arc<T> {
    async fn finalize(&self, order: &OrderPayload, key: &IdempotencyKey) -> Result<(), SagaError> {
        (**self).finalize(order, key).await
    }
}

/// In-process finalization against a ledger.
#[async_trait]
impl<L: Ledger> FinalizationService for FinalizationEngine<L> {
    async fn finalize(&self, order: &OrderPayload, key: &IdempotencyKey) -> Result<(), SagaError> {
        FinalizationEngine::finalize(self, order, Some(key)).await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryFinalizationState {
    calls: u32,
    finalized: HashSet<String>,
    fault: Fault,
}

/// In-memory finalization service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFinalizationService {
    state: Arc<RwLock<InMemoryFinalizationState>>,
}

impl InMemoryFinalizationService {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryFinalizationState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_fail_on_finalize(&self, fail: bool) {
        let mode = if fail { FailureMode::Reject } else { FailureMode::None };
        self.write().fault.set(mode, None);
    }

    pub fn fail_with(&self, mode: FailureMode, times: Option<u32>) {
        self.write().fault.set(mode, times);
    }

    pub fn calls(&self) -> u32 {
        self.write().calls
    }

    /// Returns the number of distinct finalizations applied.
    pub fn finalized_count(&self) -> usize {
        self.write().finalized.len()
    }
}

#[async_trait]
impl FinalizationService for InMemoryFinalizationService {
    async fn finalize(&self, order: &OrderPayload, key: &IdempotencyKey) -> Result<(), SagaError> {
        order.validate()?;
        let mode = {
            let mut state = self.write();
            state.calls += 1;
            state.fault.next()
        };
        inject(mode, Step::FinalizeOrder.name()).await?;

        self.write().finalized.insert(key.to_string());
        Ok(())
    }
}
