//! Gap detection and planning types
//!
//! None of these are persisted. A [`GapReport`] and the [`ProcessingPlan`]s
//! derived from it belong to one orchestration run and are dropped at its end.

use super::domain::{EventFormat, SessionType, SubDatasetKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// One session the expected schedule says should exist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledSession {
    pub round_number: u32,
    pub event_name: String,
    pub event_format: EventFormat,
    pub session_type: SessionType,
    pub session_number: u32,
}

/// Missing data for one session, across any number of sub-dataset kinds
///
/// One gap costs exactly one remote fetch no matter how many kinds it lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionGap {
    /// `None` when the session row does not exist yet
    pub session_id: Option<i64>,
    pub year: i32,
    /// Stored round of the event (scheduled round for a new event)
    pub round_number: u32,
    /// Round the schedule currently lists the event under; used for fetching
    pub provider_round: u32,
    pub event_name: String,
    pub event_format: EventFormat,
    pub session_type: SessionType,
    pub session_number: u32,
    pub missing: BTreeSet<SubDatasetKind>,
}

impl SessionGap {
    /// Chronological processing key
    pub fn order_key(&self) -> (u32, u32) {
        (self.round_number, self.session_number)
    }

    pub fn is_new_session(&self) -> bool {
        self.session_id.is_none()
    }
}

impl fmt::Display for SessionGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Round {} {} ({})",
            self.year, self.round_number, self.session_type, self.event_name
        )?;
        if !self.missing.is_empty() {
            let kinds: Vec<&str> = self.missing.iter().map(|k| k.as_str()).collect();
            write!(f, " [missing: {}]", kinds.join(", "))?;
        }
        Ok(())
    }
}

/// Everything missing for one season
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapReport {
    pub season_year: i32,
    /// Scheduled rounds with no stored event
    pub missing_events: Vec<u32>,
    /// `(round_number, session_number)` pairs with no stored session
    pub missing_sessions: Vec<(u32, u32)>,
    /// Ordered by `(round_number, session_number)`
    pub session_gaps: Vec<SessionGap>,
    /// Sessions with at least one missing item, one fetch each
    pub total_calls_needed: usize,
}

impl GapReport {
    pub fn has_gaps(&self) -> bool {
        !self.missing_events.is_empty()
            || !self.missing_sessions.is_empty()
            || !self.session_gaps.is_empty()
    }

    /// Keep only gaps belonging to `round_number`
    pub fn retain_round(&mut self, round_number: u32) {
        self.missing_events.retain(|round| *round == round_number);
        self.missing_sessions.retain(|(round, _)| *round == round_number);
        self.session_gaps.retain(|gap| gap.round_number == round_number);
        self.total_calls_needed = self.session_gaps.len();
    }

    /// Number of missing sub-datasets summed over all gaps
    pub fn missing_items(&self) -> usize {
        self.session_gaps.iter().map(|gap| gap.missing.len()).sum()
    }
}

impl fmt::Display for GapReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Gap report {}: {} missing events, {} missing sessions, {} sessions with gaps, {} calls needed",
            self.season_year,
            self.missing_events.len(),
            self.missing_sessions.len(),
            self.session_gaps.len(),
            self.total_calls_needed
        )
    }
}

/// Quota-bounded, chronologically ordered prefix of the outstanding gaps
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingPlan {
    pub items: Vec<SessionGap>,
}

impl ProcessingPlan {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Distinct events touched by the plan
    pub fn event_count(&self) -> usize {
        self.items
            .iter()
            .map(|gap| (gap.year, gap.round_number))
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SessionGap> {
        self.items.iter()
    }
}
