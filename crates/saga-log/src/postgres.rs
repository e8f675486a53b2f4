use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::store::{AppendOptions, SagaLog, validate_entries_for_append};
use crate::{EntryId, LogEntry, Result, SagaId, SagaLogError, Version};

/// PostgreSQL-backed saga log.
#[derive(Clone)]
pub struct PostgresSagaLog {
    pool: PgPool,
}

impl PostgresSagaLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_entry(row: PgRow) -> Result<LogEntry> {
        Ok(LogEntry {
            entry_id: EntryId::from_uuid(row.try_get::<Uuid, _>("id")?),
            saga_id: SagaId::from_uuid(row.try_get::<Uuid, _>("saga_id")?),
            version: Version::new(row.try_get("version")?),
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            is_terminal: row.try_get("is_terminal")?,
            recorded_at: row.try_get::<DateTime<Utc>, _>("recorded_at")?,
        })
    }
}

#[async_trait]
impl SagaLog for PostgresSagaLog {
    async fn append(&self, entries: Vec<LogEntry>, options: AppendOptions) -> Result<Version> {
        validate_entries_for_append(&entries)?;
        let saga_id = entries[0].saga_id;

        let mut tx = self.pool.begin().await?;

        if let Some(expected) = options.expected_version {
            let current: Option<i64> =
                sqlx::query_scalar("SELECT MAX(version) FROM saga_log WHERE saga_id = $1")
                    .bind(saga_id.as_uuid())
                    .fetch_one(&mut *tx)
                    .await?;

            let actual = Version::new(current.unwrap_or(0));
            if actual != expected {
                return Err(SagaLogError::ConcurrencyConflict {
                    saga_id,
                    expected,
                    actual,
                });
            }
        }

        let mut last_version = Version::initial();
        for entry in &entries {
            sqlx::query(
                r#"
                INSERT INTO saga_log (id, saga_id, version, event_type, payload, is_terminal, recorded_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(entry.entry_id.as_uuid())
            .bind(entry.saga_id.as_uuid())
            .bind(entry.version.as_i64())
            .bind(&entry.event_type)
            .bind(&entry.payload)
            .bind(entry.is_terminal)
            .bind(entry.recorded_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_saga_version")
                {
                    return SagaLogError::ConcurrencyConflict {
                        saga_id,
                        expected: options.expected_version.unwrap_or(Version::initial()),
                        actual: entry.version,
                    };
                }
                SagaLogError::Database(e)
            })?;

            last_version = entry.version;
        }

        tx.commit().await?;
        Ok(last_version)
    }

    async fn entries_for(&self, saga_id: SagaId) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, saga_id, version, event_type, payload, is_terminal, recorded_at
            FROM saga_log
            WHERE saga_id = $1
            ORDER BY version ASC
            "#,
        )
        .bind(saga_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }

    async fn current_version(&self, saga_id: SagaId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM saga_log WHERE saga_id = $1")
                .bind(saga_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;

        Ok(version.map(Version::new))
    }

    async fn open_sagas(&self) -> Result<Vec<SagaId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT saga_id
            FROM saga_log
            GROUP BY saga_id
            HAVING NOT BOOL_OR(is_terminal)
            ORDER BY MIN(recorded_at) ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(SagaId::from_uuid).collect())
    }
}
