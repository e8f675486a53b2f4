//! JSON payloads exchanged between services.
//!
//! Field names follow the wire format the storefront already speaks
//! (`user_id`, `email_id`, `product_id`); camelCase spellings are accepted
//! on input as aliases.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ProductId, SagaId, UserId};

/// Reasons an order payload is rejected before any work is done.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("No items provided")]
    EmptyCart,

    #[error("Invalid quantity {quantity} for product ID {product_id}")]
    InvalidQuantity { product_id: ProductId, quantity: i64 },

    #[error("Duplicate line for product ID {0}")]
    DuplicateProduct(ProductId),

    #[error("Quantity out of range for product ID {0}")]
    QuantityOverflow(ProductId),
}

/// A single (product, quantity) selection inside an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    #[serde(alias = "productID")]
    pub product_id: ProductId,
    pub quantity: i64,
}

impl CartItem {
    pub fn new(product_id: impl Into<ProductId>, quantity: i64) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// The order payload accepted by `confirmorder`, `placeorder`, `rollback`,
/// `payment`, `notify` and `remove`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPayload {
    #[serde(alias = "userID")]
    pub user_id: UserId,
    #[serde(alias = "emailID")]
    pub email_id: String,
    #[serde(default)]
    pub cart: Vec<CartItem>,
    /// Saga the request belongs to. Set by the orchestrator so order rows
    /// can be scoped to the saga that placed them.
    #[serde(default, alias = "sagaID", skip_serializing_if = "Option::is_none")]
    pub saga_id: Option<SagaId>,
}

impl OrderPayload {
    pub fn new(user_id: impl Into<UserId>, email_id: impl Into<String>, cart: Vec<CartItem>) -> Self {
        Self {
            user_id: user_id.into(),
            email_id: email_id.into(),
            cart,
            saga_id: None,
        }
    }

    /// Returns a copy tagged with the given saga.
    pub fn with_saga(mut self, saga_id: SagaId) -> Self {
        self.saga_id = Some(saga_id);
        self
    }

    /// Checks that the cart is non-empty, every quantity is positive and no
    /// product appears twice.
    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.cart.is_empty() {
            return Err(PayloadError::EmptyCart);
        }

        let mut seen = std::collections::HashSet::with_capacity(self.cart.len());
        for item in &self.cart {
            if item.quantity <= 0 {
                return Err(PayloadError::InvalidQuantity {
                    product_id: item.product_id,
                    quantity: item.quantity,
                });
            }
            if !seen.insert(item.product_id) {
                return Err(PayloadError::DuplicateProduct(item.product_id));
            }
        }
        Ok(())
    }

    /// Expands the order into one restock line per cart item, as accepted by
    /// the finalization rollback endpoint.
    pub fn restock_lines(&self) -> Vec<RestockLine> {
        self.cart
            .iter()
            .map(|item| RestockLine {
                user_id: self.user_id,
                email_id: self.email_id.clone(),
                product_id: item.product_id,
                quantity: item.quantity,
            })
            .collect()
    }
}

/// A fully-qualified line used to reverse a finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockLine {
    #[serde(alias = "userID")]
    pub user_id: UserId,
    #[serde(default, alias = "emailID")]
    pub email_id: String,
    #[serde(alias = "productID")]
    pub product_id: ProductId,
    pub quantity: i64,
}

/// The `{"message": ...}` body every service responds with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
