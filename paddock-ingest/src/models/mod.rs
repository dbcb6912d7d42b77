//! Data models for paddock-ingest

pub mod domain;
pub mod gap;
pub mod import_result;
pub mod import_run;

pub use domain::{EventFormat, RaceEvent, Season, Session, SessionType, SubDatasetKind};
pub use gap::{GapReport, ProcessingPlan, ScheduledSession, SessionGap};
pub use import_result::{ImportSummary, RunOutcome, SessionResult, SessionStatus};
pub use import_run::{ImportRun, PhaseTransition};
