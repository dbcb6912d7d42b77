//! Season rows

use crate::models::Season;
use paddock_common::Result;
use sqlx::{Row, SqlitePool};

/// Look up the season for `year`
pub async fn get_season(pool: &SqlitePool, year: i32) -> Result<Option<Season>> {
    let row = sqlx::query("SELECT id, year FROM seasons WHERE year = ?")
        .bind(year)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|row| Season {
        id: row.get("id"),
        year: row.get::<i64, _>("year") as i32,
    }))
}

/// Create the season for `year` if absent; returns the stored row either way
pub async fn ensure_season(pool: &SqlitePool, year: i32) -> Result<Season> {
    sqlx::query("INSERT INTO seasons (year) VALUES (?) ON CONFLICT(year) DO NOTHING")
        .bind(year)
        .execute(pool)
        .await?;

    get_season(pool, year)
        .await?
        .ok_or_else(|| paddock_common::Error::NotFound(format!("Season {} missing after insert", year)))
}
