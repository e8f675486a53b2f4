//! Durable record of saga progress.
//!
//! Every step of a saga is appended here before the downstream call it
//! describes, so a restarted orchestrator can find the sagas that never
//! reached a terminal entry and finish or compensate them.

pub mod entry;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::SagaId;
pub use entry::{EntryId, LogEntry, LogEntryBuilder, Version};
pub use error::{Result, SagaLogError};
pub use memory::InMemorySagaLog;
pub use postgres::PostgresSagaLog;
pub use store::{AppendOptions, SagaLog, SagaLogExt};
