use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use common::{IdempotencyKey, PayloadError, ProductId, SagaId, UserId};
use tokio::sync::OwnedMutexGuard;

use crate::ledger::{Ledger, LedgerTx};
use crate::locks::{KeyedLocks, ProductLocks};
use crate::{CartLine, InventoryError, OrderLine, Product, Result};

#[derive(Debug, Default)]
struct LedgerState {
    products: BTreeMap<ProductId, i64>,
    cart: BTreeMap<(UserId, ProductId), i64>,
    orders: BTreeMap<u64, OrderLine>,
    next_order_seq: u64,
    processed: HashSet<String>,
}

/// In-memory ledger for tests and single-process deployments.
///
/// Provides the same transactional surface as the PostgreSQL ledger:
/// product row locks come from [`ProductLocks`], and uncommitted writes are
/// undone when a transaction is dropped. Unlocked reads may observe writes
/// of transactions that have not committed yet.
///
/// A claimed idempotency key stays locked by its transaction and becomes
/// processed only on commit, so a concurrent claimant of the same key waits
/// for the holder to commit or roll back.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    locks: ProductLocks,
    claims: KeyedLocks<String>,
}

impl InMemoryLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger stocked with the given products.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let ledger = Self::new();
        {
            let mut state = ledger.lock_state();
            for product in products {
                state.products.insert(product.id, product.quantity);
            }
        }
        ledger
    }

    /// Returns the row locks, so callers can observe lock state.
    pub fn locks(&self) -> &ProductLocks {
        &self.locks
    }

    /// Returns the total number of order journal lines.
    pub fn order_count(&self) -> usize {
        self.lock_state().orders.len()
    }

    fn lock_state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>> {
        Ok(Box::new(InMemoryLedgerTx {
            state: self.state.clone(),
            locks: self.locks.clone(),
            claims: self.claims.clone(),
            held: HashMap::new(),
            claimed: Vec::new(),
            undo: Vec::new(),
        }))
    }

    async fn product(&self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self
            .lock_state()
            .products
            .get(&product_id)
            .map(|&quantity| Product {
                id: product_id,
                quantity,
            }))
    }

    async fn put_product(&self, product: Product) -> Result<()> {
        let _guard = self.locks.acquire(product.id).await;
        self.lock_state()
            .products
            .insert(product.id, product.quantity);
        Ok(())
    }

    async fn cart_lines(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        Ok(self
            .lock_state()
            .cart
            .iter()
            .filter(|((user, _), _)| *user == user_id)
            .map(|(&(user_id, product_id), &quantity)| CartLine {
                user_id,
                product_id,
                quantity,
            })
            .collect())
    }

    async fn order_lines(&self, user_id: UserId) -> Result<Vec<OrderLine>> {
        Ok(self
            .lock_state()
            .orders
            .values()
            .filter(|line| line.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// Write undone on rollback.
#[derive(Debug)]
enum Undo {
    Stock {
        product_id: ProductId,
        previous: i64,
    },
    Cart {
        key: (UserId, ProductId),
        previous: Option<i64>,
    },
    OrderInserted(u64),
    OrdersDeleted(Vec<(u64, OrderLine)>),
}

/// Transaction handle of [`InMemoryLedger`].
pub struct InMemoryLedgerTx {
    state: Arc<Mutex<LedgerState>>,
    locks: ProductLocks,
    claims: KeyedLocks<String>,
    held: HashMap<ProductId, OwnedMutexGuard<()>>,
    /// Keys claimed by this transaction, marked processed on commit.
    claimed: Vec<(String, OwnedMutexGuard<()>)>,
    undo: Vec<Undo>,
}

impl InMemoryLedgerTx {
    fn lock_state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn ensure_locked(&mut self, product_id: ProductId) {
        if !self.held.contains_key(&product_id) {
            let guard = self.locks.acquire(product_id).await;
            self.held.insert(product_id, guard);
        }
    }

    fn require_product(state: &LedgerState, product_id: ProductId) -> Result<i64> {
        state
            .products
            .get(&product_id)
            .copied()
            .ok_or(InventoryError::ProductNotFound(product_id))
    }

    fn rollback(&mut self) {
        let undo = std::mem::take(&mut self.undo);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for entry in undo.into_iter().rev() {
            match entry {
                Undo::Stock {
                    product_id,
                    previous,
                } => {
                    state.products.insert(product_id, previous);
                }
                Undo::Cart { key, previous } => match previous {
                    Some(quantity) => {
                        state.cart.insert(key, quantity);
                    }
                    None => {
                        state.cart.remove(&key);
                    }
                },
                Undo::OrderInserted(seq) => {
                    state.orders.remove(&seq);
                }
                Undo::OrdersDeleted(lines) => state.orders.extend(lines),
            }
        }
    }
}

impl Drop for InMemoryLedgerTx {
    fn drop(&mut self) {
        if !self.undo.is_empty() {
            tracing::debug!(writes = self.undo.len(), "rolling back in-memory transaction");
            self.rollback();
        }
    }
}

#[async_trait]
impl LedgerTx for InMemoryLedgerTx {
    async fn lock_product(&mut self, product_id: ProductId) -> Result<i64> {
        self.ensure_locked(product_id).await;
        let state = self.lock_state();
        Self::require_product(&state, product_id)
    }

    async fn adjust_stock(&mut self, product_id: ProductId, delta: i64) -> Result<()> {
        self.ensure_locked(product_id).await;
        let mut state = self.lock_state();
        let previous = Self::require_product(&state, product_id)?;
        let updated = previous
            .checked_add(delta)
            .ok_or(PayloadError::QuantityOverflow(product_id))?;
        if updated < 0 {
            return Err(InventoryError::InsufficientStock {
                product_id,
                requested: -delta,
                available: previous,
            });
        }
        state.products.insert(product_id, updated);
        drop(state);
        self.undo.push(Undo::Stock {
            product_id,
            previous,
        });
        Ok(())
    }

    async fn insert_order_line(&mut self, line: &OrderLine) -> Result<()> {
        self.ensure_locked(line.product_id).await;
        let mut state = self.lock_state();
        Self::require_product(&state, line.product_id)?;
        state.next_order_seq += 1;
        let seq = state.next_order_seq;
        state.orders.insert(seq, line.clone());
        drop(state);
        self.undo.push(Undo::OrderInserted(seq));
        Ok(())
    }

    async fn delete_order_lines(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
        email: &str,
        saga_id: Option<SagaId>,
    ) -> Result<u64> {
        self.ensure_locked(product_id).await;
        let mut state = self.lock_state();
        let matching: Vec<u64> = state
            .orders
            .iter()
            .filter(|(_, line)| line.matches(user_id, product_id, email, saga_id))
            .map(|(&seq, _)| seq)
            .collect();
        let removed: Vec<(u64, OrderLine)> = matching
            .into_iter()
            .filter_map(|seq| state.orders.remove(&seq).map(|line| (seq, line)))
            .collect();
        drop(state);

        let count = removed.len() as u64;
        if !removed.is_empty() {
            self.undo.push(Undo::OrdersDeleted(removed));
        }
        Ok(count)
    }

    async fn add_cart_line(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<()> {
        self.ensure_locked(product_id).await;
        let mut state = self.lock_state();
        Self::require_product(&state, product_id)?;
        let key = (user_id, product_id);
        let previous = state.cart.get(&key).copied();
        let updated = previous
            .unwrap_or(0)
            .checked_add(quantity)
            .ok_or(PayloadError::QuantityOverflow(product_id))?;
        state.cart.insert(key, updated);
        drop(state);
        self.undo.push(Undo::Cart { key, previous });
        Ok(())
    }

    async fn delete_cart_line(&mut self, user_id: UserId, product_id: ProductId) -> Result<u64> {
        self.ensure_locked(product_id).await;
        let key = (user_id, product_id);
        let previous = self.lock_state().cart.remove(&key);
        match previous {
            Some(_) => {
                self.undo.push(Undo::Cart { key, previous });
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn clear_cart(&mut self, user_id: UserId) -> Result<u64> {
        let products: Vec<ProductId> = self
            .lock_state()
            .cart
            .keys()
            .filter(|(user, _)| *user == user_id)
            .map(|&(_, product_id)| product_id)
            .collect();

        let mut removed = 0;
        for product_id in products {
            removed += self.delete_cart_line(user_id, product_id).await?;
        }
        Ok(removed)
    }

    async fn claim_request(&mut self, key: &IdempotencyKey) -> Result<bool> {
        let key = key.as_str().to_string();
        if self.claimed.iter().any(|(claimed, _)| *claimed == key) {
            return Ok(false);
        }

        let guard = self.claims.acquire(key.clone()).await;
        if self.lock_state().processed.contains(&key) {
            return Ok(false);
        }
        self.claimed.push((key, guard));
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut tx = self;
        {
            let mut state = tx.state.lock().unwrap_or_else(PoisonError::into_inner);
            for (key, _) in &tx.claimed {
                state.processed.insert(key.clone());
            }
        }
        tx.undo.clear();
        Ok(())
    }
}
