//! Row locks for the in-process ledger.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use common::ProductId;
use tokio::sync::OwnedMutexGuard;

/// Exclusive locks keyed by row.
///
/// Transactions touching different rows never wait on each other;
/// transactions touching the same row are serialized in lock-acquisition
/// order, like `SELECT ... FOR UPDATE` on a single row.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    locks: Arc<Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>>,
}

/// Locks on product rows.
pub type ProductLocks = KeyedLocks<ProductId>;

impl<K> Clone for KeyedLocks<K> {
    fn clone(&self) -> Self {
        Self {
            locks: self.locks.clone(),
        }
    }
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K: Hash + Eq> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and takes the lock on `key`. The lock is released when the
    /// guard is dropped.
    pub async fn acquire(&self, key: K) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(key).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Returns true if some transaction currently holds the lock on `key`.
    pub fn is_locked<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.get(key).is_some_and(|lock| lock.try_lock().is_err())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_product_is_exclusive() {
        let locks = ProductLocks::new();
        let guard = locks.acquire(ProductId::new(1)).await;
        assert!(locks.is_locked(&ProductId::new(1)));

        let pending = tokio::time::timeout(
            Duration::from_millis(20),
            locks.acquire(ProductId::new(1)),
        )
        .await;
        assert!(pending.is_err());

        drop(guard);
        assert!(!locks.is_locked(&ProductId::new(1)));
        let _again = locks.acquire(ProductId::new(1)).await;
    }

    #[tokio::test]
    async fn different_products_do_not_block() {
        let locks = ProductLocks::new();
        let _a = locks.acquire(ProductId::new(1)).await;
        let b = tokio::time::timeout(Duration::from_millis(20), locks.acquire(ProductId::new(2)))
            .await;
        assert!(b.is_ok());
    }
}
