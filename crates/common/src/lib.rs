//! Shared types for the order fulfillment services.
//!
//! Everything that crosses a service boundary lives here: identifiers,
//! the JSON payloads exchanged between the orchestrator and the inventory,
//! payment and notification services, and idempotency keys.

pub mod idempotency;
pub mod payload;
pub mod types;

pub use idempotency::{IDEMPOTENCY_KEY_HEADER, IdempotencyKey};
pub use payload::{CartItem, MessageResponse, OrderPayload, PayloadError, RestockLine};
pub use types::{ProductId, SagaId, UserId};
