//! Race event rows
//!
//! Round numbers are assigned once, on first insert, and never rewritten.

use crate::models::{EventFormat, RaceEvent, Season};
use chrono::{SecondsFormat, Utc};
use paddock_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

fn row_to_event(row: &SqliteRow) -> Result<RaceEvent> {
    let format: String = row.get("event_format");
    Ok(RaceEvent {
        id: row.get("id"),
        season_id: row.get("season_id"),
        name: row.get("name"),
        round_number: row.get::<i64, _>("round_number") as u32,
        format: EventFormat::from_str(&format)?,
    })
}

/// Events of a season ordered by round
pub async fn list_events(pool: &SqlitePool, season_id: i64) -> Result<Vec<RaceEvent>> {
    let rows = sqlx::query(
        r#"
        SELECT id, season_id, name, round_number, event_format
        FROM race_events
        WHERE season_id = ?
        ORDER BY round_number, id
        "#,
    )
    .bind(season_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_event).collect()
}

/// Find an event by name within a season
pub async fn find_event(pool: &SqlitePool, season_id: i64, name: &str) -> Result<Option<RaceEvent>> {
    let row = sqlx::query(
        r#"
        SELECT id, season_id, name, round_number, event_format
        FROM race_events
        WHERE season_id = ? AND name = ?
        "#,
    )
    .bind(season_id)
    .bind(name)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_event).transpose()
}

/// Resolve an event by `(season, name)`, creating it on first sight
///
/// An existing event is returned untouched, whatever round is proposed now.
/// A new event takes `proposed_round` if no other event of the season holds
/// it, otherwise the next round after the highest assigned one.
pub async fn get_or_create_event(
    pool: &SqlitePool,
    season: &Season,
    name: &str,
    proposed_round: u32,
    format: EventFormat,
) -> Result<RaceEvent> {
    if let Some(existing) = find_event(pool, season.id, name).await? {
        return Ok(existing);
    }

    let mut tx = pool.begin().await?;

    let taken: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM race_events WHERE season_id = ? AND round_number = ?",
    )
    .bind(season.id)
    .bind(proposed_round as i64)
    .fetch_one(&mut *tx)
    .await?;

    let round_number = if taken == 0 {
        proposed_round as i64
    } else {
        let max_round: Option<i64> =
            sqlx::query_scalar("SELECT MAX(round_number) FROM race_events WHERE season_id = ?")
                .bind(season.id)
                .fetch_one(&mut *tx)
                .await?;
        max_round.unwrap_or(0) + 1
    };

    // a concurrent run may have inserted the same name meanwhile
    sqlx::query(
        r#"
        INSERT INTO race_events (season_id, name, round_number, event_format, first_seen_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(season_id, name) DO NOTHING
        "#,
    )
    .bind(season.id)
    .bind(name)
    .bind(round_number)
    .bind(format.as_str())
    .bind(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    if round_number != proposed_round as i64 {
        tracing::warn!(
            event = name,
            proposed_round,
            assigned_round = round_number,
            "Round already taken in season, assigned next free round"
        );
    }

    find_event(pool, season.id, name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Event '{}' missing after insert", name)))
}
