//! Session rows

use crate::models::{RaceEvent, Session, SessionType};
use paddock_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

fn row_to_session(row: &SqliteRow) -> Result<Session> {
    let session_type: String = row.get("session_type");
    Ok(Session {
        id: row.get("id"),
        event_id: row.get("event_id"),
        session_type: SessionType::from_str(&session_type)?,
        session_number: row.get::<i64, _>("session_number") as u32,
    })
}

/// Sessions of an event ordered by session number
pub async fn list_sessions(pool: &SqlitePool, event_id: i64) -> Result<Vec<Session>> {
    let rows = sqlx::query(
        r#"
        SELECT id, event_id, session_type, session_number
        FROM sessions
        WHERE event_id = ?
        ORDER BY session_number, id
        "#,
    )
    .bind(event_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_session).collect()
}

pub async fn find_session(
    pool: &SqlitePool,
    event_id: i64,
    session_type: SessionType,
    session_number: u32,
) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT id, event_id, session_type, session_number
        FROM sessions
        WHERE event_id = ? AND session_type = ? AND session_number = ?
        "#,
    )
    .bind(event_id)
    .bind(session_type.as_str())
    .bind(session_number as i64)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_session).transpose()
}

/// Resolve `(event, type, number)` to a session row, inserting it if absent
///
/// Safe to call repeatedly: the unique key turns duplicates into no-ops.
pub async fn get_or_create_session(
    pool: &SqlitePool,
    event: &RaceEvent,
    session_type: SessionType,
    session_number: u32,
) -> Result<Session> {
    if let Some(existing) = find_session(pool, event.id, session_type, session_number).await? {
        return Ok(existing);
    }

    sqlx::query(
        r#"
        INSERT INTO sessions (event_id, session_type, session_number)
        VALUES (?, ?, ?)
        ON CONFLICT(event_id, session_type, session_number) DO NOTHING
        "#,
    )
    .bind(event.id)
    .bind(session_type.as_str())
    .bind(session_number as i64)
    .execute(pool)
    .await?;

    tracing::debug!(
        event = %event.name,
        session_type = %session_type,
        session_number,
        "Created session"
    );

    find_session(pool, event.id, session_type, session_number)
        .await?
        .ok_or_else(|| {
            Error::NotFound(format!(
                "Session {} #{} of '{}' missing after insert",
                session_type, session_number, event.name
            ))
        })
}

/// Total sessions stored for a season
pub async fn count_sessions_for_season(pool: &SqlitePool, season_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM sessions s
        JOIN race_events e ON e.id = s.event_id
        WHERE e.season_id = ?
        "#,
    )
    .bind(season_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}
