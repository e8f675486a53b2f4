//! Rows of the inventory tables.

use chrono::{DateTime, Utc};
use common::{ProductId, SagaId, UserId};
use serde::{Deserialize, Serialize};

/// A product and its available stock. `quantity` never drops below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub quantity: i64,
}

impl Product {
    pub fn new(id: impl Into<ProductId>, quantity: i64) -> Self {
        Self {
            id: id.into(),
            quantity,
        }
    }
}

/// A pending selection in a user's cart. One line per (user, product).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: i64,
}

/// One product line of a placed order in the order journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub user_id: UserId,
    pub email: String,
    pub product_id: ProductId,
    pub quantity: i64,
    pub order_date: DateTime<Utc>,
    /// Saga that placed the line, when placed by the orchestrator.
    pub saga_id: Option<SagaId>,
}

impl OrderLine {
    /// Returns true if this line is the one addressed by a compensation for
    /// (user, product, email), optionally scoped to a saga.
    pub fn matches(
        &self,
        user_id: UserId,
        product_id: ProductId,
        email: &str,
        saga_id: Option<SagaId>,
    ) -> bool {
        self.user_id == user_id
            && self.product_id == product_id
            && self.email == email
            && saga_id.is_none_or(|id| self.saga_id == Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(saga_id: Option<SagaId>) -> OrderLine {
        OrderLine {
            user_id: UserId::new(1),
            email: "a@b.c".to_string(),
            product_id: ProductId::new(2),
            quantity: 3,
            order_date: Utc::now(),
            saga_id,
        }
    }

    #[test]
    fn unscoped_match_ignores_saga() {
        let saga_id = SagaId::new();
        assert!(line(Some(saga_id)).matches(UserId::new(1), ProductId::new(2), "a@b.c", None));
        assert!(line(None).matches(UserId::new(1), ProductId::new(2), "a@b.c", None));
    }

    #[test]
    fn scoped_match_requires_same_saga() {
        let saga_id = SagaId::new();
        let l = line(Some(saga_id));
        assert!(l.matches(UserId::new(1), ProductId::new(2), "a@b.c", Some(saga_id)));
        assert!(!l.matches(UserId::new(1), ProductId::new(2), "a@b.c", Some(SagaId::new())));
        assert!(!line(None).matches(UserId::new(1), ProductId::new(2), "a@b.c", Some(saga_id)));
    }

    #[test]
    fn match_requires_same_email() {
        assert!(!line(None).matches(UserId::new(1), ProductId::new(2), "other@b.c", None));
    }
}
