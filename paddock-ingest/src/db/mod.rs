//! Database access for paddock-ingest
//!
//! SQLite via sqlx. Free functions per table take `&SqlitePool`; the
//! [`SqliteStore`] wraps them behind the [`SessionStore`] trait the
//! scheduler consumes.

pub mod api_calls;
pub mod datasets;
pub mod race_events;
pub mod seasons;
pub mod sessions;
pub mod store;

pub use store::{SessionStore, SqliteStore};

use paddock_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Default upper bound on lock-contention retries for writes
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Open (creating if needed) the database file and ensure tables exist
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the importer tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS seasons (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            year INTEGER NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS race_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            season_id INTEGER NOT NULL REFERENCES seasons(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            round_number INTEGER NOT NULL,
            event_format TEXT NOT NULL DEFAULT 'conventional',
            first_seen_at TEXT NOT NULL,
            UNIQUE (season_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id INTEGER NOT NULL REFERENCES race_events(id) ON DELETE CASCADE,
            session_type TEXT NOT NULL,
            session_number INTEGER NOT NULL,
            UNIQUE (event_id, session_type, session_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS session_datasets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            payload TEXT NOT NULL,
            imported_at TEXT NOT NULL,
            UNIQUE (session_id, kind)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_calls (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER REFERENCES sessions(id) ON DELETE SET NULL,
            called_at TEXT NOT NULL,
            succeeded INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_api_calls_called_at ON api_calls(called_at)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (seasons, race_events, sessions, session_datasets, api_calls)");

    Ok(())
}
