//! Gap detection
//!
//! Diffs the stored season hierarchy against the expected schedule:
//!
//! 1. scheduled events with no stored event (matched by name)
//! 2. template sessions missing under each stored event
//! 3. sub-dataset kinds missing on each stored session
//!
//! Findings fold into one [`SessionGap`] per session, so the cost of a
//! report is the number of sessions with anything missing.

use crate::db::SessionStore;
use crate::error::{ImportError, ImportResult};
use crate::models::{GapReport, RaceEvent, ScheduledSession, Season, SessionGap, SubDatasetKind};
use crate::services::schedule::ScheduleSource;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

pub struct GapDetector {
    store: Arc<dyn SessionStore>,
    schedule: Arc<dyn ScheduleSource>,
    kinds: BTreeSet<SubDatasetKind>,
}

impl GapDetector {
    pub fn new(store: Arc<dyn SessionStore>, schedule: Arc<dyn ScheduleSource>) -> Self {
        Self::with_kinds(store, schedule, &SubDatasetKind::ALL)
    }

    /// Detector that only checks `kinds` on stored sessions
    pub fn with_kinds(
        store: Arc<dyn SessionStore>,
        schedule: Arc<dyn ScheduleSource>,
        kinds: &[SubDatasetKind],
    ) -> Self {
        Self {
            store,
            schedule,
            kinds: kinds.iter().copied().collect(),
        }
    }

    /// Everything missing for `year`
    pub async fn generate_report(&self, year: i32) -> ImportResult<GapReport> {
        self.detect(year, false).await
    }

    /// Every known session of `year` as a gap for every kind
    pub async fn generate_forced_report(&self, year: i32) -> ImportResult<GapReport> {
        self.detect(year, true).await
    }

    async fn detect(&self, year: i32, force: bool) -> ImportResult<GapReport> {
        let season = self
            .store
            .get_season(year)
            .await?
            .ok_or(ImportError::SeasonNotFound(year))?;

        let expected = match self.schedule.full_schedule(year).await {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::warn!(
                    year,
                    error = %e,
                    "Schedule unavailable, checking stored events only"
                );
                Vec::new()
            }
        };

        let events = self.store.list_events(&season).await?;
        let known: HashSet<&str> = events.iter().map(|e| e.name.as_str()).collect();
        let provider_rounds: HashMap<&str, u32> = expected
            .iter()
            .map(|s| (s.event_name.as_str(), s.round_number))
            .collect();

        let mut report = GapReport {
            season_year: year,
            ..Default::default()
        };

        // 1. scheduled events never stored
        let mut seen_missing: HashSet<&str> = HashSet::new();
        for scheduled in &expected {
            if known.contains(scheduled.event_name.as_str()) {
                continue;
            }
            if seen_missing.insert(scheduled.event_name.as_str()) {
                report.missing_events.push(scheduled.round_number);
            }
            report
                .missing_sessions
                .push((scheduled.round_number, scheduled.session_number));
            report.session_gaps.push(self.new_session_gap(year, scheduled));
        }

        // 2 + 3. stored events
        for event in &events {
            let provider_round = match provider_rounds.get(event.name.as_str()) {
                Some(round) => *round,
                None => {
                    if !expected.is_empty() {
                        tracing::debug!(
                            event = %event.name,
                            round = event.round_number,
                            "Stored event not in schedule, fetching by stored round"
                        );
                    }
                    event.round_number
                }
            };
            if provider_round != event.round_number {
                tracing::info!(
                    event = %event.name,
                    stored_round = event.round_number,
                    provider_round,
                    "Event listed under a different round than stored"
                );
            }
            self.detect_event(&season, event, provider_round, force, &mut report)
                .await?;
        }

        report.missing_events.sort_unstable();
        report.missing_events.dedup();
        report.missing_sessions.sort_unstable();
        report.session_gaps.sort_by_key(SessionGap::order_key);
        report.total_calls_needed = report.session_gaps.len();

        tracing::info!(
            year,
            force,
            missing_events = report.missing_events.len(),
            missing_sessions = report.missing_sessions.len(),
            sessions_with_gaps = report.session_gaps.len(),
            missing_items = report.missing_items(),
            calls_needed = report.total_calls_needed,
            "Gap detection complete"
        );

        Ok(report)
    }

    async fn detect_event(
        &self,
        season: &Season,
        event: &RaceEvent,
        provider_round: u32,
        force: bool,
        report: &mut GapReport,
    ) -> ImportResult<()> {
        let sessions = self.store.list_sessions(event).await?;

        for (session_type, session_number) in event.format.session_template() {
            let stored = sessions
                .iter()
                .any(|s| s.session_type == *session_type && s.session_number == *session_number);
            if !stored {
                report.missing_sessions.push((event.round_number, *session_number));
                report.session_gaps.push(SessionGap {
                    session_id: None,
                    year: season.year,
                    round_number: event.round_number,
                    provider_round,
                    event_name: event.name.clone(),
                    event_format: event.format,
                    session_type: *session_type,
                    session_number: *session_number,
                    missing: self.kinds.clone(),
                });
            }
        }

        for session in &sessions {
            let missing = if force {
                self.kinds.clone()
            } else {
                let mut missing = BTreeSet::new();
                for kind in &self.kinds {
                    if !self.store.has_subdataset(session.id, *kind).await? {
                        missing.insert(*kind);
                    }
                }
                missing
            };

            if !missing.is_empty() {
                report.session_gaps.push(SessionGap {
                    session_id: Some(session.id),
                    year: season.year,
                    round_number: event.round_number,
                    provider_round,
                    event_name: event.name.clone(),
                    event_format: event.format,
                    session_type: session.session_type,
                    session_number: session.session_number,
                    missing,
                });
            }
        }

        Ok(())
    }

    fn new_session_gap(&self, year: i32, scheduled: &ScheduledSession) -> SessionGap {
        SessionGap {
            session_id: None,
            year,
            round_number: scheduled.round_number,
            provider_round: scheduled.round_number,
            event_name: scheduled.event_name.clone(),
            event_format: scheduled.event_format,
            session_type: scheduled.session_type,
            session_number: scheduled.session_number,
            missing: self.kinds.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_tables, seasons, SqliteStore, DEFAULT_MAX_LOCK_WAIT_MS};
    use crate::models::{EventFormat, SessionType};
    use crate::services::schedule::{expand_events, ScheduleError, ScheduledEvent};
    use async_trait::async_trait;
    use sqlx::SqlitePool;

    struct FixedSchedule(Vec<ScheduledEvent>);

    #[async_trait]
    impl ScheduleSource for FixedSchedule {
        async fn full_schedule(&self, _year: i32) -> Result<Vec<ScheduledSession>, ScheduleError> {
            Ok(expand_events(&self.0))
        }
    }

    fn event(round_number: u32, name: &str, format: EventFormat) -> ScheduledEvent {
        ScheduledEvent {
            round_number,
            name: name.to_string(),
            format,
        }
    }

    async fn store() -> (Arc<SqliteStore>, Season) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_tables(&pool).await.unwrap();
        let season = seasons::ensure_season(&pool, 2025).await.unwrap();
        (Arc::new(SqliteStore::new(pool, DEFAULT_MAX_LOCK_WAIT_MS)), season)
    }

    #[tokio::test]
    async fn test_unknown_season_fails() {
        let (store, _) = store().await;
        let detector = GapDetector::new(store, Arc::new(FixedSchedule(Vec::new())));
        assert!(matches!(
            detector.generate_report(1950).await,
            Err(ImportError::SeasonNotFound(1950))
        ));
    }

    #[tokio::test]
    async fn test_new_events_expand_to_one_gap_per_session() {
        let (store, _) = store().await;
        let schedule = FixedSchedule(vec![
            event(2, "Saudi Arabian Grand Prix", EventFormat::Conventional),
            event(1, "Bahrain Grand Prix", EventFormat::Sprint),
        ]);
        let detector = GapDetector::new(store, Arc::new(schedule));

        let report = detector.generate_report(2025).await.unwrap();
        assert_eq!(report.missing_events, vec![1, 2]);
        assert_eq!(report.missing_sessions.len(), 10);
        assert_eq!(report.total_calls_needed, 10);
        assert_eq!(report.missing_items(), 40);
        assert_eq!(report.session_gaps[0].event_name, "Bahrain Grand Prix");
        assert_eq!(report.session_gaps[1].session_type, SessionType::SprintQualifying);
        assert!(report.session_gaps.iter().all(SessionGap::is_new_session));
    }

    #[tokio::test]
    async fn test_stored_session_reports_only_missing_kinds() {
        let (store, season) = store().await;
        let bahrain = store
            .get_or_create_event(&season, "Bahrain Grand Prix", 1, EventFormat::Testing)
            .await
            .unwrap();
        let mut stored = Vec::new();
        for (session_type, number) in EventFormat::Testing.session_template() {
            stored.push(store.get_or_create_session(&bahrain, *session_type, *number).await.unwrap());
        }
        for session in &stored {
            for kind in SubDatasetKind::ALL {
                store
                    .persist_subdataset(session.id, kind, &serde_json::json!({}))
                    .await
                    .unwrap();
            }
        }
        // reopen one gap
        sqlx::query("DELETE FROM session_datasets WHERE session_id = ? AND kind = 'weather'")
            .bind(stored[1].id)
            .execute(store.pool())
            .await
            .unwrap();

        let schedule = FixedSchedule(vec![event(1, "Bahrain Grand Prix", EventFormat::Testing)]);
        let detector = GapDetector::new(store.clone(), Arc::new(schedule));

        let report = detector.generate_report(2025).await.unwrap();
        assert!(report.missing_events.is_empty());
        assert!(report.missing_sessions.is_empty());
        assert_eq!(report.total_calls_needed, 1);
        assert_eq!(report.session_gaps[0].session_id, Some(stored[1].id));
        assert_eq!(
            report.session_gaps[0].missing,
            BTreeSet::from([SubDatasetKind::Weather])
        );

        let forced = detector.generate_forced_report(2025).await.unwrap();
        assert_eq!(forced.total_calls_needed, 3);
        assert_eq!(forced.missing_items(), 12);
    }

    #[tokio::test]
    async fn test_stored_event_fetched_by_scheduled_round() {
        let (store, season) = store().await;
        let miami = store
            .get_or_create_event(&season, "Miami Grand Prix", 3, EventFormat::Testing)
            .await
            .unwrap();
        store
            .get_or_create_session(&miami, SessionType::Practice2, 2)
            .await
            .unwrap();

        let schedule = FixedSchedule(vec![event(6, "Miami Grand Prix", EventFormat::Testing)]);
        let report = GapDetector::new(store.clone(), Arc::new(schedule))
            .generate_report(2025)
            .await
            .unwrap();
        assert_eq!(report.total_calls_needed, 3);
        assert!(report.session_gaps.iter().all(|g| g.round_number == 3));
        assert!(report.session_gaps.iter().all(|g| g.provider_round == 6));

        // without a schedule the stored round is all there is
        let report = GapDetector::new(store, Arc::new(FixedSchedule(Vec::new())))
            .generate_report(2025)
            .await
            .unwrap();
        assert!(report.session_gaps.iter().all(|g| g.provider_round == 3));
    }
}
