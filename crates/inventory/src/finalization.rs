use common::{IdempotencyKey, OrderPayload, PayloadError, RestockLine};
use tracing::{info, warn};

use crate::ledger::{ApplyOutcome, Ledger, lock_order};
use crate::{InventoryError, Result};

/// Decrements stock for confirmed orders and restores it on rollback.
///
/// This is the only place stock goes down, so its check-and-decrement is
/// what keeps product quantities non-negative.
pub struct FinalizationEngine<L> {
    ledger: L,
}

impl<L: Ledger> FinalizationEngine<L> {
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Finalizes an order in one transaction: for every line, checks stock
    /// under the row lock, decrements it and deletes the cart line.
    #[tracing::instrument(
        skip(self, order, key),
        fields(user_id = %order.user_id, saga_id = ?order.saga_id, lines = order.cart.len())
    )]
    pub async fn finalize(
        &self,
        order: &OrderPayload,
        key: Option<&IdempotencyKey>,
    ) -> Result<ApplyOutcome> {
        order.validate()?;

        let mut tx = self.ledger.begin().await?;
        if let Some(key) = key
            && !tx.claim_request(key).await?
        {
            info!(%key, "finalize already applied");
            return Ok(ApplyOutcome::Duplicate);
        }

        for product_id in lock_order(order.cart.iter().map(|item| item.product_id)) {
            let available = tx.lock_product(product_id).await?;
            // Validate against the lock-time stock before any decrement.
            let requested = order
                .cart
                .iter()
                .filter(|item| item.product_id == product_id)
                .map(|item| item.quantity)
                .sum::<i64>();
            if requested > available {
                metrics::counter!("inventory_insufficient_stock_total", "operation" => "finalize")
                    .increment(1);
                warn!(
                    %product_id,
                    requested,
                    available,
                    "insufficient stock, rolling back finalize"
                );
                return Err(InventoryError::InsufficientStock {
                    product_id,
                    requested,
                    available,
                });
            }
        }

        for item in &order.cart {
            tx.adjust_stock(item.product_id, -item.quantity).await?;
            tx.delete_cart_line(order.user_id, item.product_id).await?;
        }

        tx.commit().await?;
        metrics::counter!("inventory_finalize_total").increment(1);
        info!("order finalized");
        Ok(ApplyOutcome::Applied)
    }

    /// Reverses [`finalize`](Self::finalize) in one transaction: adds each
    /// line's quantity back to stock and to the user's cart.
    ///
    /// An empty list is accepted and changes nothing.
    #[tracing::instrument(skip(self, lines, key), fields(lines = lines.len()))]
    pub async fn compensate_finalize(
        &self,
        lines: &[RestockLine],
        key: Option<&IdempotencyKey>,
    ) -> Result<ApplyOutcome> {
        if let Some(line) = lines.iter().find(|line| line.quantity <= 0) {
            return Err(PayloadError::InvalidQuantity {
                product_id: line.product_id,
                quantity: line.quantity,
            }
            .into());
        }

        let mut tx = self.ledger.begin().await?;
        if let Some(key) = key
            && !tx.claim_request(key).await?
        {
            info!(%key, "finalize rollback already applied");
            return Ok(ApplyOutcome::Duplicate);
        }

        for product_id in lock_order(lines.iter().map(|line| line.product_id)) {
            tx.lock_product(product_id).await?;
        }

        for line in lines {
            tx.adjust_stock(line.product_id, line.quantity).await?;
            tx.add_cart_line(line.user_id, line.product_id, line.quantity)
                .await?;
        }

        tx.commit().await?;
        info!("finalization rolled back");
        Ok(ApplyOutcome::Applied)
    }
}
