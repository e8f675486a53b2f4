//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p saga-log --test postgres_integration
//! ```

use std::sync::Arc;

use saga_log::{
    AppendOptions, LogEntry, PostgresSagaLog, SagaId, SagaLog, SagaLogError, SagaLogExt, Version,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!("../../../migrations/002_create_saga_log.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_log() -> PostgresSagaLog {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE saga_log")
        .execute(&pool)
        .await
        .unwrap();

    PostgresSagaLog::new(pool)
}

fn entry(saga_id: SagaId, version: i64, event_type: &str, terminal: bool) -> LogEntry {
    LogEntry::builder()
        .saga_id(saga_id)
        .version(Version::new(version))
        .event_type(event_type)
        .payload_raw(serde_json::json!({"step": event_type}))
        .terminal(terminal)
        .build()
        .unwrap()
}

#[tokio::test]
#[serial]
async fn append_and_read_entries() {
    let log = get_test_log().await;
    let saga_id = SagaId::new();

    log.append(
        vec![
            entry(saga_id, 1, "SagaStarted", false),
            entry(saga_id, 2, "StepStarted", false),
        ],
        AppendOptions::expect_new(),
    )
    .await
    .unwrap();

    let entries = log.entries_for(saga_id).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].event_type, "SagaStarted");
    assert_eq!(entries[1].payload["step"], "StepStarted");
    assert_eq!(log.current_version(saga_id).await.unwrap(), Some(Version::new(2)));
    assert!(log.saga_exists(saga_id).await.unwrap());
}

#[tokio::test]
#[serial]
async fn expected_version_mismatch_is_a_conflict() {
    let log = get_test_log().await;
    let saga_id = SagaId::new();
    log.append_entry(entry(saga_id, 1, "SagaStarted", false), AppendOptions::expect_new())
        .await
        .unwrap();

    let err = log
        .append_entry(entry(saga_id, 2, "StepStarted", false), AppendOptions::expect_new())
        .await
        .unwrap_err();
    assert!(matches!(err, SagaLogError::ConcurrencyConflict { .. }));
}

#[tokio::test]
#[serial]
async fn duplicate_version_is_a_conflict() {
    let log = get_test_log().await;
    let saga_id = SagaId::new();
    log.append_entry(entry(saga_id, 1, "SagaStarted", false), AppendOptions::new())
        .await
        .unwrap();

    let err = log
        .append_entry(entry(saga_id, 1, "SagaStarted", false), AppendOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SagaLogError::ConcurrencyConflict { .. }));
}

#[tokio::test]
#[serial]
async fn open_sagas_lists_only_unfinished() {
    let log = get_test_log().await;
    let open = SagaId::new();
    let done = SagaId::new();

    log.append_entry(entry(open, 1, "SagaStarted", false), AppendOptions::new())
        .await
        .unwrap();
    log.append(
        vec![
            entry(done, 1, "SagaStarted", false),
            entry(done, 2, "SagaCompleted", true),
        ],
        AppendOptions::new(),
    )
    .await
    .unwrap();

    assert_eq!(log.open_sagas().await.unwrap(), vec![open]);
}
