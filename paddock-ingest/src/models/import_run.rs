//! Import run state machine
//!
//! A run progresses through the orchestrator phases:
//! IDLE → DETECTING → QUOTA_CHECKING → PLANNING → PROCESSING
//! → (QUOTA_PAUSED → PLANNING → PROCESSING)* → SUMMARIZING → DONE
//!
//! Cancellation at a phase boundary jumps straight to SUMMARIZING.

use crate::error::ImportError;
use chrono::{DateTime, Utc};
use paddock_common::events::ImportPhase;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Phase change record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub run_id: Uuid,
    pub old_phase: ImportPhase,
    pub new_phase: ImportPhase,
    pub transitioned_at: DateTime<Utc>,
}

/// One orchestration run (in-memory only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRun {
    pub run_id: Uuid,
    pub phase: ImportPhase,
    pub year: i32,
    pub round_number: Option<u32>,
    pub force: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ImportRun {
    pub fn new(year: i32, round_number: Option<u32>, force: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            phase: ImportPhase::Idle,
            year,
            round_number,
            force,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Whether `from → to` is a legal edge
    pub fn is_valid_transition(from: ImportPhase, to: ImportPhase) -> bool {
        use ImportPhase::*;
        matches!(
            (from, to),
            (Idle, Detecting)
                | (Detecting, QuotaChecking)
                | (QuotaChecking, Planning)
                | (QuotaChecking, QuotaPaused)
                | (QuotaPaused, Planning)
                | (Planning, Processing)
                | (Processing, QuotaPaused)
                | (Processing, Planning)
                | (Processing, Summarizing)
                // cancellation at a phase boundary
                | (QuotaChecking, Summarizing)
                | (Planning, Summarizing)
                | (QuotaPaused, Summarizing)
                | (Summarizing, Done)
        )
    }

    /// Move to `new_phase`, rejecting edges outside the state machine
    pub fn transition_to(&mut self, new_phase: ImportPhase) -> Result<PhaseTransition, ImportError> {
        if !Self::is_valid_transition(self.phase, new_phase) {
            return Err(ImportError::InvalidTransition {
                from: self.phase,
                to: new_phase,
            });
        }

        let transition = PhaseTransition {
            run_id: self.run_id,
            old_phase: self.phase,
            new_phase,
            transitioned_at: Utc::now(),
        };
        self.phase = new_phase;

        if new_phase == ImportPhase::Done {
            self.ended_at = Some(Utc::now());
        }

        Ok(transition)
    }

    pub fn is_terminal(&self) -> bool {
        self.phase == ImportPhase::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut run = ImportRun::new(2025, None, false);
        for phase in [
            ImportPhase::Detecting,
            ImportPhase::QuotaChecking,
            ImportPhase::Planning,
            ImportPhase::Processing,
            ImportPhase::QuotaPaused,
            ImportPhase::Planning,
            ImportPhase::Processing,
            ImportPhase::Summarizing,
            ImportPhase::Done,
        ] {
            run.transition_to(phase).unwrap();
        }
        assert!(run.is_terminal());
        assert!(run.ended_at.is_some());
    }

    #[test]
    fn test_rejects_skipping_detection() {
        let mut run = ImportRun::new(2025, None, false);
        let err = run.transition_to(ImportPhase::Processing).unwrap_err();
        assert!(matches!(
            err,
            ImportError::InvalidTransition {
                from: ImportPhase::Idle,
                to: ImportPhase::Processing
            }
        ));
        assert_eq!(run.phase, ImportPhase::Idle);
    }

    #[test]
    fn test_done_is_terminal() {
        assert!(!ImportRun::is_valid_transition(ImportPhase::Done, ImportPhase::Detecting));
        assert!(!ImportRun::is_valid_transition(ImportPhase::Detecting, ImportPhase::Summarizing));
    }
}
