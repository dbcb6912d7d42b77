//! In-memory provider, schedule and notifier that record what they were asked

use async_trait::async_trait;
use paddock_ingest::models::{ImportSummary, ScheduledSession, SessionType};
use paddock_ingest::services::extractors::{
    CircuitInfo, CircuitMarker, DriverResult, LapRecord, SessionBlob, WeatherSample,
};
use paddock_ingest::services::schedule::expand_events;
use paddock_ingest::services::{
    FetchError, NotificationError, NotificationSink, ScheduleError, ScheduleSource, ScheduledEvent,
    TelemetryProvider,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// A session document with every section populated
pub fn full_blob() -> SessionBlob {
    SessionBlob {
        results: Some(vec![DriverResult {
            driver_number: Some("16".to_string()),
            abbreviation: Some("LEC".to_string()),
            full_name: Some("Charles Leclerc".to_string()),
            team_name: Some("Ferrari".to_string()),
            position: Some(1),
            ..Default::default()
        }]),
        weather: Some(vec![
            WeatherSample {
                air_temp: Some(24.0),
                track_temp: Some(38.5),
                rainfall: Some(false),
                ..Default::default()
            },
            WeatherSample {
                air_temp: Some(25.0),
                track_temp: Some(39.5),
                rainfall: Some(false),
                ..Default::default()
            },
        ]),
        circuit: Some(CircuitInfo {
            rotation: Some(92.0),
            corners: vec![CircuitMarker {
                number: 1,
                x: 100.0,
                y: 200.0,
                angle: 45.0,
                distance: 350.0,
                ..Default::default()
            }],
            ..Default::default()
        }),
        laps: Some(vec![
            LapRecord {
                driver: Some("LEC".to_string()),
                lap_number: 1,
                lap_time: Some(92.1),
                pit_in_time: Some(3600.0),
                ..Default::default()
            },
            LapRecord {
                driver: Some("LEC".to_string()),
                lap_number: 2,
                lap_time: Some(110.4),
                pit_out_time: Some(3622.0),
                ..Default::default()
            },
        ]),
    }
}

/// Provider serving [`full_blob`] unless told otherwise
#[derive(Default)]
pub struct FakeProvider {
    overrides: Mutex<HashMap<(u32, SessionType), SessionBlob>>,
    missing: Mutex<HashSet<(u32, SessionType)>>,
    calls: Mutex<Vec<(i32, u32, SessionType)>>,
    cancel_on_call: Mutex<Option<(usize, CancellationToken)>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, round_number: u32, session_type: SessionType, blob: SessionBlob) {
        self.overrides.lock().unwrap().insert((round_number, session_type), blob);
    }

    /// Answer NotFound for this session
    pub fn fail(&self, round_number: u32, session_type: SessionType) {
        self.missing.lock().unwrap().insert((round_number, session_type));
    }

    pub fn heal(&self, round_number: u32, session_type: SessionType) {
        self.missing.lock().unwrap().remove(&(round_number, session_type));
    }

    /// Cancel `token` while serving the `call`-th fetch (1-based)
    pub fn cancel_during_call(&self, call: usize, token: CancellationToken) {
        *self.cancel_on_call.lock().unwrap() = Some((call, token));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(i32, u32, SessionType)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called_rounds(&self) -> Vec<u32> {
        self.calls.lock().unwrap().iter().map(|(_, round, _)| *round).collect()
    }
}

#[async_trait]
impl TelemetryProvider for FakeProvider {
    async fn fetch_session_blob(
        &self,
        year: i32,
        round_number: u32,
        session_type: SessionType,
    ) -> Result<SessionBlob, FetchError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((year, round_number, session_type));
            calls.len()
        };
        if let Some((at, token)) = self.cancel_on_call.lock().unwrap().as_ref() {
            if *at == call {
                token.cancel();
            }
        }

        if self.missing.lock().unwrap().contains(&(round_number, session_type)) {
            return Err(FetchError::NotFound(format!("{} round {} {}", year, round_number, session_type)));
        }

        Ok(self
            .overrides
            .lock()
            .unwrap()
            .get(&(round_number, session_type))
            .cloned()
            .unwrap_or_else(full_blob))
    }
}

/// Schedule backed by a fixed event list, replaceable between runs
pub struct FakeSchedule {
    events: Mutex<Vec<ScheduledEvent>>,
    unavailable: Mutex<bool>,
}

impl FakeSchedule {
    pub fn new(events: Vec<ScheduledEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            unavailable: Mutex::new(false),
        }
    }

    pub fn replace(&self, events: Vec<ScheduledEvent>) {
        *self.events.lock().unwrap() = events;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }
}

#[async_trait]
impl ScheduleSource for FakeSchedule {
    async fn full_schedule(&self, _year: i32) -> Result<Vec<ScheduledSession>, ScheduleError> {
        if *self.unavailable.lock().unwrap() {
            return Err(ScheduleError::Fetch(FetchError::Transient("schedule offline".to_string())));
        }
        Ok(expand_events(&self.events.lock().unwrap()))
    }
}

/// Notifier that records deliveries, optionally rejecting all of them
#[derive(Default)]
pub struct FakeNotifier {
    reject: bool,
    completed: Mutex<Vec<ImportSummary>>,
    failed: Mutex<Vec<(i32, String)>>,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    pub fn completed(&self) -> Vec<ImportSummary> {
        self.completed.lock().unwrap().clone()
    }

    pub fn failed(&self) -> Vec<(i32, String)> {
        self.failed.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for FakeNotifier {
    async fn notify_completed(&self, summary: &ImportSummary) -> Result<(), NotificationError> {
        self.completed.lock().unwrap().push(summary.clone());
        if self.reject {
            return Err(NotificationError::Rejected {
                status: 500,
                body: "webhook down".to_string(),
            });
        }
        Ok(())
    }

    async fn notify_failed(&self, year: i32, error: &str) -> Result<(), NotificationError> {
        self.failed.lock().unwrap().push((year, error.to_string()));
        if self.reject {
            return Err(NotificationError::Network("connection refused".to_string()));
        }
        Ok(())
    }
}
