//! Expected season schedule
//!
//! A schedule source lists the events of a season with their weekend format.
//! Each event expands into the sessions its format template prescribes.
//!
//! Schedule lookups are not counted against the provider quota, so the
//! schedule comes from a file or from a calendar service that is not the
//! telemetry provider.

use super::telemetry_client::{FetchError, USER_AGENT};
use crate::models::{EventFormat, ScheduledSession};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Schedule fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to read schedule file {path}: {reason}")]
    File { path: PathBuf, reason: String },
}

/// One event as listed by a schedule source
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScheduledEvent {
    pub round_number: u32,
    pub name: String,
    #[serde(default)]
    pub format: EventFormat,
}

/// What should exist for a season
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// Every expected session of `year`, ordered by `(round, session_number)`
    async fn full_schedule(&self, year: i32) -> Result<Vec<ScheduledSession>, ScheduleError>;
}

/// Expand events into their template sessions, chronologically ordered
pub fn expand_events(events: &[ScheduledEvent]) -> Vec<ScheduledSession> {
    let mut sessions: Vec<ScheduledSession> = events
        .iter()
        .flat_map(|event| {
            event
                .format
                .session_template()
                .iter()
                .map(move |(session_type, session_number)| ScheduledSession {
                    round_number: event.round_number,
                    event_name: event.name.clone(),
                    event_format: event.format,
                    session_type: *session_type,
                    session_number: *session_number,
                })
        })
        .collect();

    sessions.sort_by_key(|s| (s.round_number, s.session_number));
    sessions
}

#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    #[serde(default)]
    events: Vec<ScheduledEvent>,
}

/// Schedule served by a calendar service: `GET {base}/schedule/{year}`
pub struct HttpSchedule {
    client: Client,
    base_url: String,
}

impl HttpSchedule {
    pub fn new(base_url: &str, timeout: Duration) -> paddock_common::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| paddock_common::Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn schedule_url(&self, year: i32) -> String {
        format!("{}/schedule/{}", self.base_url, year)
    }
}

#[async_trait]
impl ScheduleSource for HttpSchedule {
    async fn full_schedule(&self, year: i32) -> Result<Vec<ScheduledSession>, ScheduleError> {
        let url = self.schedule_url(year);
        tracing::debug!(url = %url, "Querying schedule service");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(format!("schedule {}", year)).into());
        }
        if !status.is_success() {
            return Err(FetchError::Transient(format!("HTTP {}", status.as_u16())).into());
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;
        let schedule: ScheduleResponse = serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::Malformed(format!("schedule {}: {}", year, e)))?;

        Ok(expand_events(&schedule.events))
    }
}

#[derive(Debug, Deserialize)]
struct ScheduleFile {
    #[serde(default)]
    events: Vec<FileEvent>,
}

#[derive(Debug, Deserialize)]
struct FileEvent {
    year: i32,
    round_number: u32,
    name: String,
    #[serde(default)]
    format: EventFormat,
}

/// Schedule read from a TOML file
///
/// ```toml
/// [[events]]
/// year = 2025
/// round_number = 6
/// name = "Miami Grand Prix"
/// format = "sprint"
/// ```
///
/// The file is re-read on every call so edits apply to the next run.
#[derive(Debug, Clone)]
pub struct FileSchedule {
    path: PathBuf,
}

impl FileSchedule {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(&self, content: &str, year: i32) -> Result<Vec<ScheduledEvent>, ScheduleError> {
        let file: ScheduleFile = toml::from_str(content).map_err(|e| ScheduleError::File {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        Ok(file
            .events
            .into_iter()
            .filter(|entry| entry.year == year)
            .map(|entry| ScheduledEvent {
                round_number: entry.round_number,
                name: entry.name,
                format: entry.format,
            })
            .collect())
    }
}

#[async_trait]
impl ScheduleSource for FileSchedule {
    async fn full_schedule(&self, year: i32) -> Result<Vec<ScheduledSession>, ScheduleError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ScheduleError::File {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        let events = self.parse(&content, year)?;
        tracing::debug!(
            path = %self.path.display(),
            year,
            events = events.len(),
            "Loaded schedule file"
        );
        Ok(expand_events(&events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionType;
    use std::io::Write;

    #[test]
    fn test_expand_orders_by_round_then_session() {
        let events = vec![
            ScheduledEvent {
                round_number: 2,
                name: "Jeddah".to_string(),
                format: EventFormat::Sprint,
            },
            ScheduledEvent {
                round_number: 1,
                name: "Sakhir Testing".to_string(),
                format: EventFormat::Testing,
            },
        ];

        let sessions = expand_events(&events);
        assert_eq!(sessions.len(), 8);
        assert_eq!(sessions[0].event_name, "Sakhir Testing");
        assert_eq!(sessions[3].session_type, SessionType::Practice1);
        assert_eq!(sessions[4].session_type, SessionType::SprintQualifying);
        assert_eq!(sessions[7].session_type, SessionType::Race);
    }

    #[tokio::test]
    async fn test_file_schedule_filters_by_year() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[events]]
year = 2025
round_number = 1
name = "Australian Grand Prix"

[[events]]
year = 2025
round_number = 6
name = "Miami Grand Prix"
format = "sprint"

[[events]]
year = 2024
round_number = 1
name = "Bahrain Grand Prix"
"#
        )
        .unwrap();

        let schedule = FileSchedule::new(file.path());
        let sessions = schedule.full_schedule(2025).await.unwrap();
        assert_eq!(sessions.len(), 10);
        assert!(sessions.iter().all(|s| s.event_name != "Bahrain Grand Prix"));
        assert_eq!(sessions[5].event_format, EventFormat::Sprint);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let schedule = FileSchedule::new("/nonexistent/paddock/schedule.toml");
        assert!(matches!(
            schedule.full_schedule(2025).await,
            Err(ScheduleError::File { .. })
        ));
    }

    #[test]
    fn test_schedule_url() {
        let schedule = HttpSchedule::new("http://calendar.local/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(schedule.base_url(), "http://calendar.local/api");
        assert_eq!(schedule.schedule_url(2025), "http://calendar.local/api/schedule/2025");
    }

    #[tokio::test]
    async fn test_unreachable_schedule_service_is_fetch_error() {
        let schedule = HttpSchedule::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        assert!(matches!(
            schedule.full_schedule(2025).await,
            Err(ScheduleError::Fetch(FetchError::Transient(_)))
        ));
    }
}
