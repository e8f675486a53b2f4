use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Result, SagaId, SagaLogError};

/// Unique identifier for a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an entry within its saga's log.
///
/// Versions start at 1 for the first entry and increase by 1 per entry.
/// Version 0 means "no entries yet".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Version of a saga with no entries.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Version of a saga's first entry.
    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// One persisted saga event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub entry_id: EntryId,
    pub saga_id: SagaId,
    pub version: Version,
    /// Event name, e.g. "StepStarted".
    pub event_type: String,
    pub payload: serde_json::Value,
    /// Set on the entry that moves the saga into a terminal state. Sagas
    /// without a terminal entry are picked up by recovery.
    pub is_terminal: bool,
    pub recorded_at: DateTime<Utc>,
}

impl LogEntry {
    pub fn builder() -> LogEntryBuilder {
        LogEntryBuilder::default()
    }

    /// Deserializes the payload into a concrete event type.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Builder for [`LogEntry`].
#[derive(Debug, Default)]
pub struct LogEntryBuilder {
    entry_id: Option<EntryId>,
    saga_id: Option<SagaId>,
    version: Option<Version>,
    event_type: Option<String>,
    payload: Option<serde_json::Value>,
    is_terminal: bool,
    recorded_at: Option<DateTime<Utc>>,
}

impl LogEntryBuilder {
    pub fn entry_id(mut self, id: EntryId) -> Self {
        self.entry_id = Some(id);
        self
    }

    pub fn saga_id(mut self, saga_id: SagaId) -> Self {
        self.saga_id = Some(saga_id);
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn terminal(mut self, is_terminal: bool) -> Self {
        self.is_terminal = is_terminal;
        self
    }

    pub fn recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = Some(recorded_at);
        self
    }

    /// Builds the entry, failing if saga id, version, event type or payload
    /// is missing.
    pub fn build(self) -> Result<LogEntry> {
        let missing = |field: &str| SagaLogError::InvalidAppend(format!("{field} is required"));
        Ok(LogEntry {
            entry_id: self.entry_id.unwrap_or_default(),
            saga_id: self.saga_id.ok_or_else(|| missing("saga_id"))?,
            version: self.version.ok_or_else(|| missing("version"))?,
            event_type: self.event_type.ok_or_else(|| missing("event_type"))?,
            payload: self.payload.ok_or_else(|| missing("payload"))?,
            is_terminal: self.is_terminal,
            recorded_at: self.recorded_at.unwrap_or_else(Utc::now),
        })
    }
}
