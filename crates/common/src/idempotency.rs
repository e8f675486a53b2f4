//! Idempotency keys for retried downstream calls.

use serde::{Deserialize, Serialize};

use crate::types::SagaId;

/// HTTP header carrying the idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Key identifying one logical request, so a retried call is applied at
/// most once. Keys issued by the orchestrator have the form
/// `<saga-id>:<step>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derives the key for a saga step.
    pub fn for_step(saga_id: SagaId, step: &str) -> Self {
        Self(format!("{saga_id}:{step}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
