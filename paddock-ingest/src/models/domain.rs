//! Persisted entities: season → event → session → sub-datasets

use paddock_common::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A championship year. At most one per year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub id: i64,
    pub year: i32,
}

/// A race weekend within a season
///
/// `round_number` is assigned when the event is first stored and never
/// changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceEvent {
    pub id: i64,
    pub season_id: i64,
    pub name: String,
    pub round_number: u32,
    pub format: EventFormat,
}

/// One on-track session of an event; the unit of remote fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub event_id: i64,
    pub session_type: SessionType,
    pub session_number: u32,
}

/// Weekend format, which decides the expected session template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventFormat {
    #[default]
    Conventional,
    Sprint,
    Testing,
}

impl EventFormat {
    /// Expected `(session_type, session_number)` pairs for this format
    pub fn session_template(&self) -> &'static [(SessionType, u32)] {
        match self {
            EventFormat::Conventional => &[
                (SessionType::Practice1, 1),
                (SessionType::Practice2, 2),
                (SessionType::Practice3, 3),
                (SessionType::Qualifying, 4),
                (SessionType::Race, 5),
            ],
            EventFormat::Sprint => &[
                (SessionType::Practice1, 1),
                (SessionType::SprintQualifying, 2),
                (SessionType::Sprint, 3),
                (SessionType::Qualifying, 4),
                (SessionType::Race, 5),
            ],
            EventFormat::Testing => &[
                (SessionType::Practice1, 1),
                (SessionType::Practice2, 2),
                (SessionType::Practice3, 3),
            ],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventFormat::Conventional => "conventional",
            EventFormat::Sprint => "sprint",
            EventFormat::Testing => "testing",
        }
    }
}

impl FromStr for EventFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conventional" => Ok(EventFormat::Conventional),
            "sprint" | "sprint_shootout" | "sprint_qualifying" => Ok(EventFormat::Sprint),
            "testing" => Ok(EventFormat::Testing),
            other => Err(Error::InvalidInput(format!("Unknown event format: {}", other))),
        }
    }
}

/// Session type, stored by display name and fetched by provider code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SessionType {
    #[serde(rename = "Practice 1")]
    Practice1,
    #[serde(rename = "Practice 2")]
    Practice2,
    #[serde(rename = "Practice 3")]
    Practice3,
    #[serde(rename = "Sprint Qualifying")]
    SprintQualifying,
    #[serde(rename = "Sprint")]
    Sprint,
    #[serde(rename = "Qualifying")]
    Qualifying,
    #[serde(rename = "Race")]
    Race,
}

impl SessionType {
    /// Name stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Practice1 => "Practice 1",
            SessionType::Practice2 => "Practice 2",
            SessionType::Practice3 => "Practice 3",
            SessionType::SprintQualifying => "Sprint Qualifying",
            SessionType::Sprint => "Sprint",
            SessionType::Qualifying => "Qualifying",
            SessionType::Race => "Race",
        }
    }

    /// Identifier the telemetry provider expects in URLs
    pub fn provider_code(&self) -> &'static str {
        match self {
            SessionType::Practice1 => "FP1",
            SessionType::Practice2 => "FP2",
            SessionType::Practice3 => "FP3",
            SessionType::SprintQualifying => "SQ",
            SessionType::Sprint => "S",
            SessionType::Qualifying => "Q",
            SessionType::Race => "R",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionType {
    type Err = Error;

    /// Accepts stored names ("Practice 1") and provider codes ("FP1")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Practice 1" | "FP1" => Ok(SessionType::Practice1),
            "Practice 2" | "FP2" => Ok(SessionType::Practice2),
            "Practice 3" | "FP3" => Ok(SessionType::Practice3),
            "Sprint Qualifying" | "Sprint Shootout" | "SQ" => Ok(SessionType::SprintQualifying),
            "Sprint" | "S" => Ok(SessionType::Sprint),
            "Qualifying" | "Q" => Ok(SessionType::Qualifying),
            "Race" | "R" => Ok(SessionType::Race),
            other => Err(Error::InvalidInput(format!("Unknown session type: {}", other))),
        }
    }
}

/// A category of data derivable from one session fetch
///
/// Declaration order is processing order: driver classification is stored
/// before anything that references driver numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubDatasetKind {
    Drivers,
    Weather,
    Circuit,
    Laps,
}

impl SubDatasetKind {
    /// Every kind the importer currently knows how to extract
    pub const ALL: [SubDatasetKind; 4] = [
        SubDatasetKind::Drivers,
        SubDatasetKind::Weather,
        SubDatasetKind::Circuit,
        SubDatasetKind::Laps,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubDatasetKind::Drivers => "drivers",
            SubDatasetKind::Weather => "weather",
            SubDatasetKind::Circuit => "circuit",
            SubDatasetKind::Laps => "laps",
        }
    }
}

impl fmt::Display for SubDatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubDatasetKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubDatasetKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown dataset kind: {}", s)))
    }
}
