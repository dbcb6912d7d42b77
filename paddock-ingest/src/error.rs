//! Error types for paddock-ingest
//!
//! Only [`ImportError::SeasonNotFound`] aborts a run. Fetch and extraction
//! failures are recorded on the session result, quota exhaustion becomes a
//! pause, and notification failures are logged and dropped.

use crate::models::{SessionType, SubDatasetKind};
use crate::services::extractors::ExtractionError;
use crate::services::telemetry_client::FetchError;
use paddock_common::events::ImportPhase;
use thiserror::Error;

/// Import error
#[derive(Debug, Error)]
pub enum ImportError {
    /// Season row absent; raised before any quota is spent
    #[error("Season {0} not found")]
    SeasonNotFound(i32),

    /// Remote fetch for one session failed; the session stays a gap
    #[error("Fetch failed for {year} round {round_number} {session_type}: {source}")]
    SessionFetchFailed {
        year: i32,
        round_number: u32,
        session_type: SessionType,
        #[source]
        source: FetchError,
    },

    /// One sub-dataset could not be extracted or stored
    #[error("Extraction of {kind} failed: {reason}")]
    SubdatasetExtractionFailed { kind: SubDatasetKind, reason: String },

    /// Orchestrator attempted an edge outside its state machine
    #[error("Invalid phase transition {from} → {to}")]
    InvalidTransition { from: ImportPhase, to: ImportPhase },

    /// Persistence layer error
    #[error("Store error: {0}")]
    Store(#[from] paddock_common::Error),
}

impl ImportError {
    pub fn extraction(kind: SubDatasetKind, err: &ExtractionError) -> Self {
        ImportError::SubdatasetExtractionFailed {
            kind,
            reason: err.to_string(),
        }
    }
}

/// Result type for import operations
pub type ImportResult<T> = Result<T, ImportError>;
