use common::{PayloadError, ProductId, UserId};
use tracing::info;

use crate::ledger::Ledger;
use crate::{CartLine, InventoryError, Result};

/// Client-facing cart operations.
pub struct CartStore<L> {
    ledger: L,
}

impl<L: Ledger> CartStore<L> {
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    /// Adds `quantity` of a product to the user's cart, provided the product
    /// currently has that much stock. Repeated adds accumulate.
    #[tracing::instrument(skip(self))]
    pub async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<()> {
        if quantity <= 0 {
            return Err(PayloadError::InvalidQuantity {
                product_id,
                quantity,
            }
            .into());
        }

        let mut tx = self.ledger.begin().await?;
        let available = tx.lock_product(product_id).await?;
        if quantity > available {
            return Err(InventoryError::InsufficientStock {
                product_id,
                requested: quantity,
                available,
            });
        }
        tx.add_cart_line(user_id, product_id, quantity).await?;
        tx.commit().await?;

        info!("item added to cart");
        Ok(())
    }

    /// Returns the user's cart lines.
    pub async fn get_cart(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        self.ledger.cart_lines(user_id).await
    }

    /// Deletes every line of the user's cart. Returns how many were removed.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_cart(&self, user_id: UserId) -> Result<u64> {
        let mut tx = self.ledger.begin().await?;
        let removed = tx.clear_cart(user_id).await?;
        tx.commit().await?;

        info!(removed, "cart cancelled");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryLedger, Product};

    fn store() -> CartStore<InMemoryLedger> {
        CartStore::new(InMemoryLedger::with_products([Product::new(1, 5)]))
    }

    #[tokio::test]
    async fn adds_accumulate() {
        let store = store();
        store.add_to_cart(UserId::new(1), ProductId::new(1), 2).await.unwrap();
        store.add_to_cart(UserId::new(1), ProductId::new(1), 1).await.unwrap();

        let cart = store.get_cart(UserId::new(1)).await.unwrap();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0].quantity, 3);
    }

    #[tokio::test]
    async fn add_rejects_more_than_stock() {
        let store = store();
        let err = store
            .add_to_cart(UserId::new(1), ProductId::new(1), 6)
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::InsufficientStock { available: 5, .. }));
        assert!(store.get_cart(UserId::new(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_rejects_unknown_product_and_bad_quantity() {
        let store = store();
        assert!(matches!(
            store.add_to_cart(UserId::new(1), ProductId::new(9), 1).await,
            Err(InventoryError::ProductNotFound(_))
        ));
        assert!(matches!(
            store.add_to_cart(UserId::new(1), ProductId::new(1), 0).await,
            Err(InventoryError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn cancel_empties_the_cart() {
        let store = store();
        store.add_to_cart(UserId::new(1), ProductId::new(1), 2).await.unwrap();
        assert_eq!(store.cancel_cart(UserId::new(1)).await.unwrap(), 1);
        assert!(store.get_cart(UserId::new(1)).await.unwrap().is_empty());
        assert_eq!(store.cancel_cart(UserId::new(1)).await.unwrap(), 0);
    }
}
