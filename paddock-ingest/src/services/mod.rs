//! Import scheduler services and their external clients

pub mod batch_planner;
pub mod extractors;
pub mod gap_detector;
pub mod import_orchestrator;
pub mod notifier;
pub mod quota_tracker;
pub mod schedule;
pub mod session_processor;
pub mod telemetry_client;

pub use batch_planner::BatchPlanner;
pub use extractors::{ExtractionError, SessionBlob};
pub use gap_detector::GapDetector;
pub use import_orchestrator::ImportOrchestrator;
pub use notifier::{LogNotifier, NotificationError, NotificationSink, SlackNotifier};
pub use quota_tracker::{QuotaExceeded, QuotaStats, QuotaStatus, QuotaTracker};
pub use schedule::{FileSchedule, HttpSchedule, ScheduleError, ScheduleSource, ScheduledEvent};
pub use session_processor::SessionProcessor;
pub use telemetry_client::{FetchError, HttpTelemetryProvider, TelemetryProvider};
