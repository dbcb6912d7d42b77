//! Per-session outcomes and the terminal run summary

use super::domain::{SessionType, SubDatasetKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Outcome of processing one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Every attempted kind was extracted and stored
    Success,
    /// Some kinds stored, some failed
    Partial,
    /// Fetch failed, or nothing could be stored
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Success => "success",
            SessionStatus::Partial => "partial",
            SessionStatus::Failed => "failed",
        }
    }
}

/// Result of one Session Processor invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: Option<i64>,
    pub year: i32,
    pub round_number: u32,
    pub session_type: SessionType,
    pub session_number: u32,
    pub extracted: BTreeSet<SubDatasetKind>,
    pub failed: BTreeSet<SubDatasetKind>,
    pub status: SessionStatus,
    /// Human-readable failure reasons, one per failed step
    pub errors: Vec<String>,
}

impl SessionResult {
    /// Derive the status from what was extracted and what failed
    pub fn resolve_status(extracted: &BTreeSet<SubDatasetKind>, failed: &BTreeSet<SubDatasetKind>) -> SessionStatus {
        match (extracted.is_empty(), failed.is_empty()) {
            (_, true) => SessionStatus::Success,
            (false, false) => SessionStatus::Partial,
            (true, false) => SessionStatus::Failed,
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

/// Terminal summary handed to the notification sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub run_id: Uuid,
    pub year: i32,
    pub round_number: Option<u32>,
    pub force: bool,
    pub outcome: RunOutcome,
    /// Sessions in the gap report after round filtering
    pub gaps_detected: usize,
    pub sessions_processed: usize,
    pub succeeded: usize,
    pub partial: usize,
    pub failed: usize,
    /// Successfully stored sub-datasets per kind
    pub per_kind_counts: BTreeMap<SubDatasetKind, usize>,
    /// Provider calls spent by this run
    pub calls_made: u32,
    pub pauses: u32,
    pub duration_seconds: f64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ImportSummary {
    pub fn new(run_id: Uuid, year: i32, round_number: Option<u32>, force: bool) -> Self {
        Self {
            run_id,
            year,
            round_number,
            force,
            outcome: RunOutcome::Completed,
            gaps_detected: 0,
            sessions_processed: 0,
            succeeded: 0,
            partial: 0,
            failed: 0,
            per_kind_counts: SubDatasetKind::ALL.iter().map(|k| (*k, 0)).collect(),
            calls_made: 0,
            pauses: 0,
            duration_seconds: 0.0,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Fold one session result into the counters
    pub fn record(&mut self, result: &SessionResult) {
        self.sessions_processed += 1;
        match result.status {
            SessionStatus::Success => self.succeeded += 1,
            SessionStatus::Partial => self.partial += 1,
            SessionStatus::Failed => self.failed += 1,
        }
        for kind in &result.extracted {
            *self.per_kind_counts.entry(*kind).or_insert(0) += 1;
        }
    }

    /// Stamp end time and duration
    pub fn finish(&mut self, outcome: RunOutcome, duration_seconds: f64) {
        self.outcome = outcome;
        self.duration_seconds = duration_seconds;
        self.ended_at = Some(Utc::now());
    }

    pub fn kind_count(&self, kind: SubDatasetKind) -> usize {
        self.per_kind_counts.get(&kind).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(extracted: &[SubDatasetKind], failed: &[SubDatasetKind]) -> SessionResult {
        let extracted: BTreeSet<_> = extracted.iter().copied().collect();
        let failed: BTreeSet<_> = failed.iter().copied().collect();
        SessionResult {
            session_id: Some(1),
            year: 2025,
            round_number: 1,
            session_type: SessionType::Race,
            session_number: 5,
            status: SessionResult::resolve_status(&extracted, &failed),
            extracted,
            failed,
            errors: Vec::new(),
        }
    }

    #[test]
    fn test_status_resolution() {
        assert_eq!(result(&[SubDatasetKind::Weather], &[]).status, SessionStatus::Success);
        assert_eq!(
            result(&[SubDatasetKind::Circuit], &[SubDatasetKind::Weather]).status,
            SessionStatus::Partial
        );
        assert_eq!(result(&[], &[SubDatasetKind::Weather]).status, SessionStatus::Failed);
    }

    #[test]
    fn test_summary_counts_kinds_only_for_extracted() {
        let mut summary = ImportSummary::new(Uuid::new_v4(), 2025, None, false);
        summary.record(&result(&[SubDatasetKind::Circuit], &[SubDatasetKind::Weather]));
        summary.record(&result(&[SubDatasetKind::Circuit, SubDatasetKind::Weather], &[]));

        assert_eq!(summary.sessions_processed, 2);
        assert_eq!(summary.partial, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.kind_count(SubDatasetKind::Circuit), 2);
        assert_eq!(summary.kind_count(SubDatasetKind::Weather), 1);
        assert_eq!(summary.kind_count(SubDatasetKind::Laps), 0);
    }
}
