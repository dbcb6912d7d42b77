//! Per-session sub-dataset rows
//!
//! One row per `(session, kind)`; the payload is the extracted JSON.

use crate::models::SubDatasetKind;
use crate::utils::retry_on_lock;
use chrono::{SecondsFormat, Utc};
use paddock_common::Result;
use sqlx::SqlitePool;

pub async fn has_dataset(pool: &SqlitePool, session_id: i64, kind: SubDatasetKind) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM session_datasets WHERE session_id = ? AND kind = ?",
    )
    .bind(session_id)
    .bind(kind.as_str())
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

/// Store one extracted sub-dataset, replacing any earlier payload
///
/// Each call commits on its own, so kinds stored before a crash survive it.
pub async fn upsert_dataset(
    pool: &SqlitePool,
    session_id: i64,
    kind: SubDatasetKind,
    payload: &serde_json::Value,
    max_wait_ms: u64,
) -> Result<()> {
    // Prepare all data BEFORE touching the database
    let payload = serde_json::to_string(payload)?;
    let imported_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

    retry_on_lock("persist sub-dataset", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO session_datasets (session_id, kind, payload, imported_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(session_id, kind) DO UPDATE SET
                payload = excluded.payload,
                imported_at = excluded.imported_at
            "#,
        )
        .bind(session_id)
        .bind(kind.as_str())
        .bind(&payload)
        .bind(&imported_at)
        .execute(pool)
        .await
        .map_err(paddock_common::Error::Database)?;

        Ok(())
    })
    .await
}

/// Stored payload for `(session, kind)`
pub async fn load_dataset(
    pool: &SqlitePool,
    session_id: i64,
    kind: SubDatasetKind,
) -> Result<Option<serde_json::Value>> {
    let payload: Option<String> = sqlx::query_scalar(
        "SELECT payload FROM session_datasets WHERE session_id = ? AND kind = ?",
    )
    .bind(session_id)
    .bind(kind.as_str())
    .fetch_optional(pool)
    .await?;

    payload
        .map(|text| serde_json::from_str(&text).map_err(paddock_common::Error::from))
        .transpose()
}

pub async fn count_datasets(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM session_datasets")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
