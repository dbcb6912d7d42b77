//! Test helper utilities
//!
//! Shared fixtures for the paddock-ingest integration tests

#![allow(dead_code)]

pub mod fakes;

pub use fakes::{full_blob, FakeNotifier, FakeProvider, FakeSchedule};

use paddock_common::events::EventBus;
use paddock_ingest::db::{self, seasons, SqliteStore, DEFAULT_MAX_LOCK_WAIT_MS};
use paddock_ingest::models::{EventFormat, Season};
use paddock_ingest::services::{ImportOrchestrator, QuotaTracker, ScheduledEvent};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const YEAR: i32 = 2025;
pub const HOUR: Duration = Duration::from_secs(3600);

/// Temporary database; keep `_dir` alive for the duration of the test
pub struct TestDb {
    pub _dir: TempDir,
    pub pool: SqlitePool,
    pub store: Arc<SqliteStore>,
}

/// Temporary database with no season rows
pub async fn create_empty_db() -> TestDb {
    let dir = TempDir::new().unwrap();
    let pool = db::init_database_pool(&dir.path().join("paddock_test.db"))
        .await
        .unwrap();
    let store = Arc::new(SqliteStore::new(pool.clone(), DEFAULT_MAX_LOCK_WAIT_MS));
    TestDb { _dir: dir, pool, store }
}

/// Temporary database holding the season for [`YEAR`]
pub async fn create_test_db() -> (TestDb, Season) {
    let db = create_empty_db().await;
    let season = seasons::ensure_season(&db.pool, YEAR).await.unwrap();
    (db, season)
}

pub fn event(round_number: u32, name: &str, format: EventFormat) -> ScheduledEvent {
    ScheduledEvent {
        round_number,
        name: name.to_string(),
        format,
    }
}

/// Testing-format events (three sessions each) for the given rounds
pub fn testing_events(rounds: &[u32]) -> Vec<ScheduledEvent> {
    rounds
        .iter()
        .map(|round| event(*round, &format!("Test Event {}", round), EventFormat::Testing))
        .collect()
}

pub fn orchestrator(
    db: &TestDb,
    schedule: Arc<FakeSchedule>,
    provider: Arc<FakeProvider>,
    quota: Arc<QuotaTracker>,
    notifier: Arc<FakeNotifier>,
) -> ImportOrchestrator {
    ImportOrchestrator::new(db.store.clone(), schedule, provider, quota, notifier, EventBus::default())
}

pub async fn count_datasets(db: &TestDb) -> i64 {
    db::datasets::count_datasets(&db.pool).await.unwrap()
}

pub async fn count_sessions(db: &TestDb, season: &Season) -> i64 {
    db::sessions::count_sessions_for_season(&db.pool, season.id).await.unwrap()
}
