use std::collections::HashMap;

use chrono::Utc;
use common::{IdempotencyKey, OrderPayload, ProductId};
use tracing::{info, warn};

use crate::ledger::{ApplyOutcome, Ledger, LedgerTx, lock_order};
use crate::{InventoryError, OrderLine, Result};

/// Moves cart lines into the order journal and back.
///
/// `place` only checks availability; stock is decremented later by
/// [`FinalizationEngine::finalize`](crate::FinalizationEngine::finalize).
/// Two orders may therefore both pass `place` against the same stock, and
/// the conflict surfaces at finalization.
pub struct ReservationEngine<L> {
    ledger: L,
}

impl<L: Ledger> ReservationEngine<L> {
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Places an order in one transaction: for every line, checks stock
    /// under the product's row lock, journals an order line and removes the
    /// cart line. Any failing line rolls back the whole order.
    #[tracing::instrument(
        skip(self, order, key),
        fields(user_id = %order.user_id, saga_id = ?order.saga_id, lines = order.cart.len())
    )]
    pub async fn place(
        &self,
        order: &OrderPayload,
        key: Option<&IdempotencyKey>,
    ) -> Result<ApplyOutcome> {
        order.validate()?;

        let mut tx = self.ledger.begin().await?;
        if let Some(key) = key
            && !tx.claim_request(key).await?
        {
            info!(%key, "place already applied");
            return Ok(ApplyOutcome::Duplicate);
        }

        let stock = lock_products(tx.as_mut(), order).await?;
        let order_date = Utc::now();

        for item in &order.cart {
            let available = stock
                .get(&item.product_id)
                .copied()
                .ok_or(InventoryError::ProductNotFound(item.product_id))?;
            if item.quantity > available {
                metrics::counter!("inventory_insufficient_stock_total", "operation" => "place")
                    .increment(1);
                warn!(
                    product_id = %item.product_id,
                    requested = item.quantity,
                    available,
                    "insufficient stock, rolling back place"
                );
                return Err(InventoryError::InsufficientStock {
                    product_id: item.product_id,
                    requested: item.quantity,
                    available,
                });
            }

            tx.insert_order_line(&OrderLine {
                user_id: order.user_id,
                email: order.email_id.clone(),
                product_id: item.product_id,
                quantity: item.quantity,
                order_date,
                saga_id: order.saga_id,
            })
            .await?;
            tx.delete_cart_line(order.user_id, item.product_id).await?;
        }

        tx.commit().await?;
        metrics::counter!("inventory_place_total").increment(1);
        info!("order placed");
        Ok(ApplyOutcome::Applied)
    }

    /// Undoes [`place`](Self::place) in one transaction: deletes the journal
    /// lines of the order and puts the cart lines back.
    ///
    /// When the order carries a saga id only that saga's journal lines are
    /// deleted, and a cart line is restored only if its journal line was
    /// actually removed. Compensating a place that never committed is then
    /// a no-op.
    #[tracing::instrument(
        skip(self, order, key),
        fields(user_id = %order.user_id, saga_id = ?order.saga_id, lines = order.cart.len())
    )]
    pub async fn compensate_place(
        &self,
        order: &OrderPayload,
        key: Option<&IdempotencyKey>,
    ) -> Result<ApplyOutcome> {
        order.validate()?;

        let mut tx = self.ledger.begin().await?;
        if let Some(key) = key
            && !tx.claim_request(key).await?
        {
            info!(%key, "compensation already applied");
            return Ok(ApplyOutcome::Duplicate);
        }

        lock_products(tx.as_mut(), order).await?;

        let mut restored = 0;
        for item in &order.cart {
            let removed = tx
                .delete_order_lines(order.user_id, item.product_id, &order.email_id, order.saga_id)
                .await?;
            if order.saga_id.is_none() || removed > 0 {
                tx.add_cart_line(order.user_id, item.product_id, item.quantity)
                    .await?;
                restored += 1;
            }
        }

        tx.commit().await?;
        info!(restored, "order rolled back");
        Ok(ApplyOutcome::Applied)
    }
}

/// Locks every product of the order in ascending id order and returns the
/// stock read under each lock.
async fn lock_products(
    tx: &mut dyn LedgerTx,
    order: &OrderPayload,
) -> Result<HashMap<ProductId, i64>> {
    let mut stock = HashMap::with_capacity(order.cart.len());
    for product_id in lock_order(order.cart.iter().map(|item| item.product_id)) {
        let available = tx.lock_product(product_id).await?;
        stock.insert(product_id, available);
    }
    Ok(stock)
}
