use common::{PayloadError, ProductId};
use thiserror::Error;

/// Errors raised by the inventory engines and ledger backends.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The request payload failed validation; nothing was touched.
    #[error("Invalid request payload: {0}")]
    Validation(#[from] PayloadError),

    /// A line referenced a product the ledger does not know.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The requested quantity exceeds the available stock.
    /// The whole transaction was rolled back.
    #[error("Insufficient quantity for product ID {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    /// A database statement, begin or commit failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl InventoryError {
    /// Returns true if the caller sent something the ledger will never accept
    /// as-is (bad payload or not enough stock).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            InventoryError::Validation(_) | InventoryError::InsufficientStock { .. }
        )
    }
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
