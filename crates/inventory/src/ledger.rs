use std::sync::Arc;

use async_trait::async_trait;
use common::{IdempotencyKey, ProductId, SagaId, UserId};

use crate::{CartLine, OrderLine, Product, Result};

/// Whether a transactional request changed the ledger or was recognised as
/// a replay of an already-committed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Duplicate,
}

/// Storage behind the inventory engines.
///
/// Implementations must be thread-safe. Reads outside a transaction are
/// unlocked snapshots for reporting; every mutation goes through
/// [`Ledger::begin`].
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Starts a transaction. Dropping the returned handle without calling
    /// [`LedgerTx::commit`] rolls back everything done through it and
    /// releases its locks.
    async fn begin(&self) -> Result<Box<dyn LedgerTx>>;

    /// Returns a product and its current stock.
    async fn product(&self, product_id: ProductId) -> Result<Option<Product>>;

    /// Creates a product or overwrites its stock level.
    async fn put_product(&self, product: Product) -> Result<()>;

    /// Returns the user's cart, ordered by product.
    async fn cart_lines(&self, user_id: UserId) -> Result<Vec<CartLine>>;

    /// Returns the user's order journal lines, oldest first.
    async fn order_lines(&self, user_id: UserId) -> Result<Vec<OrderLine>>;
}

/// A single ledger transaction.
///
/// Row locks taken by [`LedgerTx::lock_product`] are held until the
/// transaction commits or is dropped. Callers lock products in ascending id
/// order so that two transactions never wait on each other in a cycle.
#[async_trait]
pub trait LedgerTx: Send {
    /// Takes the exclusive lock on a product row and returns its stock.
    async fn lock_product(&mut self, product_id: ProductId) -> Result<i64>;

    /// Adds `delta` (possibly negative) to a product's stock.
    async fn adjust_stock(&mut self, product_id: ProductId, delta: i64) -> Result<()>;

    /// Appends a line to the order journal.
    async fn insert_order_line(&mut self, line: &OrderLine) -> Result<()>;

    /// Deletes the journal lines for (user, product, email), restricted to
    /// one saga when `saga_id` is set. Returns the number of lines removed.
    async fn delete_order_lines(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
        email: &str,
        saga_id: Option<SagaId>,
    ) -> Result<u64>;

    /// Adds `quantity` to the user's cart line for the product, creating
    /// the line if needed.
    async fn add_cart_line(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<()>;

    /// Deletes the user's cart line for the product. Returns the number of
    /// lines removed (0 or 1).
    async fn delete_cart_line(&mut self, user_id: UserId, product_id: ProductId) -> Result<u64>;

    /// Deletes every cart line of the user. Returns the number removed.
    async fn clear_cart(&mut self, user_id: UserId) -> Result<u64>;

    /// Records the idempotency key as part of this transaction. Returns
    /// false if a committed transaction already recorded it.
    async fn claim_request(&mut self, key: &IdempotencyKey) -> Result<bool>;

    /// Commits every change and releases the locks.
    async fn commit(self: Box<Self>) -> Result<()>;
}

#[async_trait]
impl<T: Ledger + ?Sized> Ledger for Arc<T> {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>> {
        (**self).begin().await
    }

    async fn product(&self, product_id: ProductId) -> Result<Option<Product>> {
        (**self).product(product_id).await
    }

    async fn put_product(&self, product: Product) -> Result<()> {
        (**self).put_product(product).await
    }

    async fn cart_lines(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        (**self).cart_lines(user_id).await
    }

    async fn order_lines(&self, user_id: UserId) -> Result<Vec<OrderLine>> {
        (**self).order_lines(user_id).await
    }
}

/// Returns the product ids of `lines` in lock order.
pub(crate) fn lock_order<I>(lines: I) -> Vec<ProductId>
where
    I: IntoIterator<Item = ProductId>,
{
    let mut ids: Vec<ProductId> = lines.into_iter().collect();
    ids.sort();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_order_sorts_and_dedups() {
        let ids = lock_order([3, 1, 2, 1].map(ProductId::new));
        assert_eq!(ids, [1, 2, 3].map(ProductId::new).to_vec());
    }
}
