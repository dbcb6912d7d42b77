//! Provider call log
//!
//! Every remote fetch attempt is recorded, successful or not, so a restarted
//! process can see how much of the current quota window is already spent.

use crate::utils::retry_on_lock;
use chrono::{DateTime, SecondsFormat, Utc};
use paddock_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::time::Duration;

/// Calls logged inside a trailing window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowUsage {
    pub calls: u32,
    /// Time of the oldest call still inside the window
    pub oldest_call_at: Option<DateTime<Utc>>,
}

impl WindowUsage {
    /// How long ago the window opened, relative to `now`
    pub fn opened_ago(&self, now: DateTime<Utc>) -> Duration {
        self.oldest_call_at
            .and_then(|oldest| (now - oldest).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }
}

pub async fn record_api_call(
    pool: &SqlitePool,
    session_id: Option<i64>,
    succeeded: bool,
    max_wait_ms: u64,
) -> Result<()> {
    let called_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

    retry_on_lock("record api call", max_wait_ms, || async {
        sqlx::query("INSERT INTO api_calls (session_id, called_at, succeeded) VALUES (?, ?, ?)")
            .bind(session_id)
            .bind(&called_at)
            .bind(succeeded)
            .execute(pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    })
    .await
}

/// Calls made since `now - window`
pub async fn window_usage(pool: &SqlitePool, window: Duration, now: DateTime<Utc>) -> Result<WindowUsage> {
    let window = chrono::Duration::from_std(window)
        .map_err(|e| Error::InvalidInput(format!("Quota window out of range: {}", e)))?;
    let since = (now - window).to_rfc3339_opts(SecondsFormat::Micros, true);

    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS calls, MIN(called_at) AS oldest
        FROM api_calls
        WHERE called_at >= ?
        "#,
    )
    .bind(&since)
    .fetch_one(pool)
    .await?;

    let calls: i64 = row.get("calls");
    let oldest: Option<String> = row.get("oldest");
    let oldest_call_at = oldest
        .map(|text| {
            DateTime::parse_from_rfc3339(&text)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| Error::Internal(format!("Bad api_calls timestamp '{}': {}", text, e)))
        })
        .transpose()?;

    Ok(WindowUsage {
        calls: calls.max(0) as u32,
        oldest_call_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_tables;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_tables(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_window_usage_counts_recent_calls() {
        let pool = memory_pool().await;
        record_api_call(&pool, None, true, 1000).await.unwrap();
        record_api_call(&pool, None, false, 1000).await.unwrap();

        let usage = window_usage(&pool, Duration::from_secs(3600), Utc::now()).await.unwrap();
        assert_eq!(usage.calls, 2);
        assert!(usage.oldest_call_at.is_some());
    }

    #[tokio::test]
    async fn test_window_usage_ignores_old_calls() {
        let pool = memory_pool().await;
        let old = (Utc::now() - chrono::Duration::hours(2)).to_rfc3339_opts(SecondsFormat::Micros, true);
        sqlx::query("INSERT INTO api_calls (session_id, called_at, succeeded) VALUES (NULL, ?, 1)")
            .bind(&old)
            .execute(&pool)
            .await
            .unwrap();

        let usage = window_usage(&pool, Duration::from_secs(3600), Utc::now()).await.unwrap();
        assert_eq!(usage.calls, 0);
        assert_eq!(usage.oldest_call_at, None);
        assert_eq!(usage.opened_ago(Utc::now()), Duration::ZERO);
    }
}
