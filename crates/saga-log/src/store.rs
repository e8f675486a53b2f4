use std::sync::Arc;

use async_trait::async_trait;

use crate::{LogEntry, Result, SagaId, SagaLogError, Version};

/// Options for appending entries to the log.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Version the saga must be at for the append to succeed.
    /// If None, only the unique (saga, version) constraint applies.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Expects the saga to have no entries yet.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }
}

/// Append-only storage for saga entries.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait SagaLog: Send + Sync {
    /// Appends entries of one saga atomically and returns the saga's new
    /// version. Fails with `ConcurrencyConflict` if the saga is not at
    /// `options.expected_version` or one of the versions is taken.
    async fn append(&self, entries: Vec<LogEntry>, options: AppendOptions) -> Result<Version>;

    /// Returns every entry of a saga, oldest first.
    async fn entries_for(&self, saga_id: SagaId) -> Result<Vec<LogEntry>>;

    /// Returns the saga's current version, or None if it has no entries.
    async fn current_version(&self, saga_id: SagaId) -> Result<Option<Version>>;

    /// Returns the sagas that have entries but no terminal entry, in the
    /// order they were started.
    async fn open_sagas(&self) -> Result<Vec<SagaId>>;
}

/// Convenience methods for saga logs.
#[async_trait]
pub trait SagaLogExt: SagaLog {
    async fn append_entry(&self, entry: LogEntry, options: AppendOptions) -> Result<Version> {
        self.append(vec![entry], options).await
    }

    async fn saga_exists(&self, saga_id: SagaId) -> Result<bool> {
        Ok(self.current_version(saga_id).await?.is_some())
    }
}

impl<T: SagaLog + ?Sized> SagaLogExt for T {}

#[async_trait]
impl<T: SagaLog + ?Sized> SagaLog for Arc<T> {
    async fn append(&self, entries: Vec<LogEntry>, options: AppendOptions) -> Result<Version> {
        (**self).append(entries, options).await
    }

    async fn entries_for(&self, saga_id: SagaId) -> Result<Vec<LogEntry>> {
        (**self).entries_for(saga_id).await
    }

    async fn current_version(&self, saga_id: SagaId) -> Result<Option<Version>> {
        (**self).current_version(saga_id).await
    }

    async fn open_sagas(&self) -> Result<Vec<SagaId>> {
        (**self).open_sagas().await
    }
}

/// Checks that a batch is non-empty, belongs to one saga and has
/// consecutive versions.
pub(crate) fn validate_entries_for_append(entries: &[LogEntry]) -> Result<()> {
    let Some(first) = entries.first() else {
        return Err(SagaLogError::InvalidAppend(
            "Cannot append empty entry list".to_string(),
        ));
    };

    let mut expected_version = first.version;
    for entry in entries.iter().skip(1) {
        if entry.saga_id != first.saga_id {
            return Err(SagaLogError::InvalidAppend(
                "All entries must be for the same saga".to_string(),
            ));
        }
        expected_version = expected_version.next();
        if entry.version != expected_version {
            return Err(SagaLogError::InvalidAppend(format!(
                "Entry versions must be sequential. Expected {}, got {}",
                expected_version, entry.version
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(saga_id: SagaId, version: i64) -> LogEntry {
        LogEntry::builder()
            .saga_id(saga_id)
            .version(Version::new(version))
            .event_type("Test")
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap()
    }

    #[test]
    fn rejects_empty_batch() {
        assert!(validate_entries_for_append(&[]).is_err());
    }

    #[test]
    fn rejects_gaps_and_mixed_sagas() {
        let saga_id = SagaId::new();
        assert!(validate_entries_for_append(&[entry(saga_id, 1), entry(saga_id, 3)]).is_err());
        assert!(validate_entries_for_append(&[entry(saga_id, 1), entry(SagaId::new(), 2)]).is_err());
        assert!(validate_entries_for_append(&[entry(saga_id, 1), entry(saga_id, 2)]).is_ok());
    }
}
