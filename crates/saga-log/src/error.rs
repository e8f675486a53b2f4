use thiserror::Error;

use crate::{SagaId, Version};

/// Errors that can occur when reading or writing the saga log.
#[derive(Debug, Error)]
pub enum SagaLogError {
    /// Another writer appended to the saga first.
    #[error(
        "Concurrency conflict for saga {saga_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        saga_id: SagaId,
        expected: Version,
        actual: Version,
    },

    /// The entries handed to `append` are not a valid batch.
    #[error("Invalid append: {0}")]
    InvalidAppend(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for saga log operations.
pub type Result<T> = std::result::Result<T, SagaLogError>;
