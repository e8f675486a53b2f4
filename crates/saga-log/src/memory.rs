use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::store::{AppendOptions, SagaLog, validate_entries_for_append};
use crate::{LogEntry, Result, SagaId, SagaLogError, Version};

/// In-memory saga log for tests and single-process deployments.
#[derive(Clone, Default)]
pub struct InMemorySagaLog {
    entries: Arc<RwLock<Vec<LogEntry>>>,
}

impl InMemorySagaLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of entries stored.
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    fn version_of(entries: &[LogEntry], saga_id: SagaId) -> Version {
        entries
            .iter()
            .filter(|e| e.saga_id == saga_id)
            .map(|e| e.version)
            .max()
            .unwrap_or(Version::initial())
    }
}

#[async_trait]
impl SagaLog for InMemorySagaLog {
    async fn append(&self, entries: Vec<LogEntry>, options: AppendOptions) -> Result<Version> {
        validate_entries_for_append(&entries)?;
        let saga_id = entries[0].saga_id;

        let mut store = self.entries.write().await;
        let current = Self::version_of(&store, saga_id);

        if let Some(expected) = options.expected_version
            && current != expected
        {
            return Err(SagaLogError::ConcurrencyConflict {
                saga_id,
                expected,
                actual: current,
            });
        }

        // Same effect as the unique (saga_id, version) constraint.
        if entries[0].version <= current {
            return Err(SagaLogError::ConcurrencyConflict {
                saga_id,
                expected: options.expected_version.unwrap_or(current),
                actual: current,
            });
        }

        let last = entries.last().map(|e| e.version).unwrap_or(current);
        store.extend(entries);
        Ok(last)
    }

    async fn entries_for(&self, saga_id: SagaId) -> Result<Vec<LogEntry>> {
        let store = self.entries.read().await;
        let mut entries: Vec<_> = store
            .iter()
            .filter(|e| e.saga_id == saga_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.version);
        Ok(entries)
    }

    async fn current_version(&self, saga_id: SagaId) -> Result<Option<Version>> {
        let store = self.entries.read().await;
        let version = Self::version_of(&store, saga_id);
        Ok((version != Version::initial()).then_some(version))
    }

    async fn open_sagas(&self) -> Result<Vec<SagaId>> {
        let store = self.entries.read().await;
        let closed: HashSet<SagaId> = store
            .iter()
            .filter(|e| e.is_terminal)
            .map(|e| e.saga_id)
            .collect();

        let mut seen = HashSet::new();
        Ok(store
            .iter()
            .map(|e| e.saga_id)
            .filter(|id| !closed.contains(id) && seen.insert(*id))
            .collect())
    }
}
