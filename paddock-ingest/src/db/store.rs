//! Persistence seam consumed by the scheduler

use super::{api_calls, datasets, race_events, seasons, sessions};
use crate::models::{EventFormat, RaceEvent, Season, Session, SessionType, SubDatasetKind};
use async_trait::async_trait;
use paddock_common::Result;
use sqlx::SqlitePool;

/// Create-or-get and upsert operations over the season hierarchy
///
/// Every create operation is safe to repeat: a second call with the same key
/// returns the row the first call stored.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_season(&self, year: i32) -> Result<Option<Season>>;

    async fn list_events(&self, season: &Season) -> Result<Vec<RaceEvent>>;

    async fn get_or_create_event(
        &self,
        season: &Season,
        name: &str,
        assigned_round: u32,
        format: EventFormat,
    ) -> Result<RaceEvent>;

    async fn list_sessions(&self, event: &RaceEvent) -> Result<Vec<Session>>;

    async fn get_or_create_session(
        &self,
        event: &RaceEvent,
        session_type: SessionType,
        session_number: u32,
    ) -> Result<Session>;

    async fn has_subdataset(&self, session_id: i64, kind: SubDatasetKind) -> Result<bool>;

    async fn persist_subdataset(
        &self,
        session_id: i64,
        kind: SubDatasetKind,
        payload: &serde_json::Value,
    ) -> Result<()>;

    /// Log one provider call attempt
    async fn record_api_call(&self, session_id: Option<i64>, succeeded: bool) -> Result<()>;
}

/// [`SessionStore`] backed by the SQLite pool
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn get_season(&self, year: i32) -> Result<Option<Season>> {
        seasons::get_season(&self.pool, year).await
    }

    async fn list_events(&self, season: &Season) -> Result<Vec<RaceEvent>> {
        race_events::list_events(&self.pool, season.id).await
    }

    async fn get_or_create_event(
        &self,
        season: &Season,
        name: &str,
        assigned_round: u32,
        format: EventFormat,
    ) -> Result<RaceEvent> {
        race_events::get_or_create_event(&self.pool, season, name, assigned_round, format).await
    }

    async fn list_sessions(&self, event: &RaceEvent) -> Result<Vec<Session>> {
        sessions::list_sessions(&self.pool, event.id).await
    }

    async fn get_or_create_session(
        &self,
        event: &RaceEvent,
        session_type: SessionType,
        session_number: u32,
    ) -> Result<Session> {
        sessions::get_or_create_session(&self.pool, event, session_type, session_number).await
    }

    async fn has_subdataset(&self, session_id: i64, kind: SubDatasetKind) -> Result<bool> {
        datasets::has_dataset(&self.pool, session_id, kind).await
    }

    async fn persist_subdataset(
        &self,
        session_id: i64,
        kind: SubDatasetKind,
        payload: &serde_json::Value,
    ) -> Result<()> {
        datasets::upsert_dataset(&self.pool, session_id, kind, payload, self.max_lock_wait_ms).await
    }

    async fn record_api_call(&self, session_id: Option<i64>, succeeded: bool) -> Result<()> {
        api_calls::record_api_call(&self.pool, session_id, succeeded, self.max_lock_wait_ms).await
    }
}
