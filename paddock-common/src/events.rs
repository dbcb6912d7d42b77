//! Import event types and EventBus
//!
//! The orchestrator broadcasts progress through an [`EventBus`]. Subscribers
//! (progress display, log sinks, tests) receive every event emitted after
//! they subscribe. Emission never blocks and never fails the import.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Orchestrator phase
///
/// Idle → Detecting → QuotaChecking → Planning → Processing
/// → (QuotaPaused ⇄ Processing) → Summarizing → Done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportPhase {
    Idle,
    Detecting,
    QuotaChecking,
    Planning,
    Processing,
    QuotaPaused,
    Summarizing,
    Done,
}

impl ImportPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportPhase::Idle => "IDLE",
            ImportPhase::Detecting => "DETECTING",
            ImportPhase::QuotaChecking => "QUOTA_CHECKING",
            ImportPhase::Planning => "PLANNING",
            ImportPhase::Processing => "PROCESSING",
            ImportPhase::QuotaPaused => "QUOTA_PAUSED",
            ImportPhase::Summarizing => "SUMMARIZING",
            ImportPhase::Done => "DONE",
        }
    }
}

impl std::fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Import events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ImportEvent {
    /// Import run accepted
    RunStarted {
        run_id: Uuid,
        year: i32,
        round_number: Option<u32>,
        force: bool,
        timestamp: DateTime<Utc>,
    },

    /// Orchestrator moved between phases
    PhaseChanged {
        run_id: Uuid,
        old_phase: ImportPhase,
        new_phase: ImportPhase,
        timestamp: DateTime<Utc>,
    },

    /// Gap detection finished
    GapsDetected {
        run_id: Uuid,
        year: i32,
        missing_events: usize,
        missing_sessions: usize,
        sessions_with_gaps: usize,
        calls_needed: usize,
        timestamp: DateTime<Utc>,
    },

    /// One session finished (fetch + all extractions)
    SessionProcessed {
        run_id: Uuid,
        round_number: u32,
        session_type: String,
        session_number: u32,
        /// "success", "partial" or "failed"
        status: String,
        extracted: Vec<String>,
        failed: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// Quota exhausted; run waits for the window to roll over
    QuotaPaused {
        run_id: Uuid,
        resume_in_seconds: u64,
        sessions_remaining: usize,
        timestamp: DateTime<Utc>,
    },

    /// Quota window rolled over; processing continues
    QuotaResumed {
        run_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Run reached Done
    RunCompleted {
        run_id: Uuid,
        sessions_processed: usize,
        calls_made: u32,
        duration_seconds: f64,
        cancelled: bool,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast channel for [`ImportEvent`]s
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ImportEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering `capacity` events per lagging subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ImportEvent> {
        self.tx.subscribe()
    }

    /// Emit an event
    ///
    /// Returns `Ok(subscriber_count)`, or `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ImportEvent,
    ) -> Result<usize, broadcast::error::SendError<ImportEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: ImportEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let run_id = Uuid::new_v4();
        bus.emit(ImportEvent::QuotaResumed {
            run_id,
            timestamp: Utc::now(),
        })
        .unwrap();

        match rx.recv().await.unwrap() {
            ImportEvent::QuotaResumed { run_id: got, .. } => assert_eq!(got, run_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        assert!(bus
            .emit(ImportEvent::QuotaResumed {
                run_id: Uuid::new_v4(),
                timestamp: Utc::now(),
            })
            .is_err());

        // lossy variant must not panic
        bus.emit_lossy(ImportEvent::QuotaResumed {
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        });
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.capacity(), 4);
    }

    #[test]
    fn test_phase_serializes_screaming_case() {
        let json = serde_json::to_string(&ImportPhase::QuotaPaused).unwrap();
        assert_eq!(json, "\"QUOTA_PAUSED\"");
        assert_eq!(ImportPhase::QuotaChecking.to_string(), "QUOTA_CHECKING");
    }
}
