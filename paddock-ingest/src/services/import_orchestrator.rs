//! Import orchestrator
//!
//! **State progression**
//! IDLE → DETECTING → QUOTA_CHECKING → PLANNING → PROCESSING
//! → (QUOTA_PAUSED ⇄ PLANNING → PROCESSING) → SUMMARIZING → DONE
//!
//! Sessions are processed one at a time in gap order. Each item reserves one
//! quota call before it runs; when the reservation fails the run pauses until
//! the window resets, then re-plans from the gaps still outstanding.
//!
//! Cancellation is checked at phase boundaries and before every item, never
//! inside one, so every stored sub-dataset is complete.

use crate::db::SessionStore;
use crate::error::{ImportError, ImportResult};
use crate::models::{ImportRun, ImportSummary, RunOutcome, Season, SessionGap, SessionResult, SubDatasetKind};
use crate::services::batch_planner::BatchPlanner;
use crate::services::gap_detector::GapDetector;
use crate::services::notifier::NotificationSink;
use crate::services::quota_tracker::QuotaTracker;
use crate::services::schedule::ScheduleSource;
use crate::services::session_processor::SessionProcessor;
use crate::services::telemetry_client::TelemetryProvider;
use chrono::Utc;
use paddock_common::events::{EventBus, ImportEvent, ImportPhase};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct ImportOrchestrator {
    store: Arc<dyn SessionStore>,
    schedule: Arc<dyn ScheduleSource>,
    detector: GapDetector,
    planner: BatchPlanner,
    processor: SessionProcessor,
    quota: Arc<QuotaTracker>,
    notifier: Arc<dyn NotificationSink>,
    event_bus: EventBus,
}

impl ImportOrchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        schedule: Arc<dyn ScheduleSource>,
        provider: Arc<dyn TelemetryProvider>,
        quota: Arc<QuotaTracker>,
        notifier: Arc<dyn NotificationSink>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            detector: GapDetector::new(Arc::clone(&store), Arc::clone(&schedule)),
            processor: SessionProcessor::new(Arc::clone(&store), provider),
            planner: BatchPlanner::default(),
            store,
            schedule,
            quota,
            notifier,
            event_bus,
        }
    }

    pub fn with_planner(mut self, planner: BatchPlanner) -> Self {
        self.planner = planner;
        self
    }

    /// Restrict the sub-dataset kinds checked on stored sessions
    pub fn with_kinds(mut self, kinds: &[SubDatasetKind]) -> Self {
        self.detector = GapDetector::with_kinds(Arc::clone(&self.store), Arc::clone(&self.schedule), kinds);
        self
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    /// Import everything missing for `year`
    ///
    /// Fails only with [`ImportError::SeasonNotFound`] (or a store error
    /// during detection), and always before any quota is spent. Every other
    /// failure ends up in the summary counts.
    pub async fn run_import(
        &self,
        year: i32,
        round_number: Option<u32>,
        force: bool,
        notify: bool,
        cancel_token: &CancellationToken,
    ) -> ImportResult<ImportSummary> {
        let start_time = Instant::now();
        let mut run = ImportRun::new(year, round_number, force);

        tracing::info!(
            run_id = %run.run_id,
            year,
            round = ?round_number,
            force,
            "Starting import run"
        );
        let stats = self.quota.stats();
        tracing::info!(
            calls_made = stats.calls_made,
            ceiling = stats.ceiling,
            remaining = stats.remaining,
            resets_in_seconds = stats.resets_in_seconds,
            status = ?stats.status,
            "Quota at run start"
        );

        self.event_bus.emit_lossy(ImportEvent::RunStarted {
            run_id: run.run_id,
            year,
            round_number,
            force,
            timestamp: Utc::now(),
        });

        // DETECTING
        self.transition(&mut run, ImportPhase::Detecting)?;
        let (season, outstanding) = match self.detect(&run).await {
            Ok(detected) => detected,
            Err(e) => {
                tracing::error!(year, error = %e, "Import run aborted during gap detection");
                if notify {
                    self.deliver_failure(year, &e).await;
                }
                return Err(e);
            }
        };

        let mut summary = ImportSummary::new(run.run_id, year, round_number, force);
        summary.gaps_detected = outstanding.len();

        let outcome = self
            .process_gaps(&mut run, &season, outstanding, &mut summary, cancel_token)
            .await?;

        // SUMMARIZING
        self.transition(&mut run, ImportPhase::Summarizing)?;
        summary.finish(outcome, start_time.elapsed().as_secs_f64());

        tracing::info!(
            run_id = %run.run_id,
            outcome = ?summary.outcome,
            sessions_processed = summary.sessions_processed,
            succeeded = summary.succeeded,
            partial = summary.partial,
            failed = summary.failed,
            calls_made = summary.calls_made,
            pauses = summary.pauses,
            duration_seconds = summary.duration_seconds,
            "Import run summarized"
        );

        if notify {
            if let Err(e) = self.notifier.notify_completed(&summary).await {
                tracing::warn!(run_id = %run.run_id, error = %e, "Summary notification not delivered");
            }
        }

        self.transition(&mut run, ImportPhase::Done)?;
        self.event_bus.emit_lossy(ImportEvent::RunCompleted {
            run_id: run.run_id,
            sessions_processed: summary.sessions_processed,
            calls_made: summary.calls_made,
            duration_seconds: summary.duration_seconds,
            cancelled: summary.outcome == RunOutcome::Cancelled,
            timestamp: Utc::now(),
        });

        Ok(summary)
    }

    /// Season row plus the ordered gaps to work through
    async fn detect(&self, run: &ImportRun) -> ImportResult<(Season, Vec<SessionGap>)> {
        let season = self
            .store
            .get_season(run.year)
            .await?
            .ok_or(ImportError::SeasonNotFound(run.year))?;

        let mut report = if run.force {
            self.detector.generate_forced_report(run.year).await?
        } else {
            self.detector.generate_report(run.year).await?
        };

        if let Some(round) = run.round_number {
            report.retain_round(round);
            tracing::info!(round, sessions_with_gaps = report.session_gaps.len(), "Gap report filtered to round");
        }

        self.event_bus.emit_lossy(ImportEvent::GapsDetected {
            run_id: run.run_id,
            year: run.year,
            missing_events: report.missing_events.len(),
            missing_sessions: report.missing_sessions.len(),
            sessions_with_gaps: report.session_gaps.len(),
            calls_needed: report.total_calls_needed,
            timestamp: Utc::now(),
        });

        Ok((season, report.session_gaps))
    }

    /// QUOTA_CHECKING through PROCESSING, including pauses
    ///
    /// Leaves the run in a phase from which SUMMARIZING is legal.
    async fn process_gaps(
        &self,
        run: &mut ImportRun,
        season: &Season,
        mut outstanding: Vec<SessionGap>,
        summary: &mut ImportSummary,
        cancel_token: &CancellationToken,
    ) -> ImportResult<RunOutcome> {
        // QUOTA_CHECKING
        self.transition(run, ImportPhase::QuotaChecking)?;
        if cancel_token.is_cancelled() {
            tracing::info!("Import cancelled before planning");
            return Ok(RunOutcome::Cancelled);
        }

        if !outstanding.is_empty() && self.quota.remaining() == 0 {
            if !self.pause(run, outstanding.len(), summary, cancel_token).await? {
                return Ok(RunOutcome::Cancelled);
            }
        }

        loop {
            // PLANNING
            self.transition(run, ImportPhase::Planning)?;
            if cancel_token.is_cancelled() {
                tracing::info!(remaining = outstanding.len(), "Import cancelled at planning");
                return Ok(RunOutcome::Cancelled);
            }

            let plan = self.planner.plan_gaps(&outstanding, Some(self.quota.remaining()));
            if plan.is_empty() {
                if outstanding.is_empty() {
                    return Ok(RunOutcome::Completed);
                }
                if self.quota.remaining() > 0 || self.quota.ceiling() == 0 {
                    tracing::warn!(
                        remaining = outstanding.len(),
                        "Planner produced no work for outstanding gaps, stopping"
                    );
                    return Ok(RunOutcome::Completed);
                }
            }

            // PROCESSING
            self.transition(run, ImportPhase::Processing)?;
            let mut processed = 0;
            let mut cancelled = false;
            for gap in plan.iter() {
                if cancel_token.is_cancelled() {
                    cancelled = true;
                    break;
                }
                if let Err(exceeded) = self.quota.consume(1) {
                    tracing::warn!(error = %exceeded, "No quota for next session");
                    break;
                }

                let result = self.processor.process(season, gap).await;
                summary.calls_made += 1;
                summary.record(&result);
                self.emit_session_processed(run, &result);
                processed += 1;
            }

            // plan is a prefix of the ordered outstanding gaps
            outstanding.sort_by_key(SessionGap::order_key);
            outstanding.drain(..processed);

            if cancelled {
                tracing::info!(remaining = outstanding.len(), "Import cancelled between sessions");
                return Ok(RunOutcome::Cancelled);
            }
            if outstanding.is_empty() {
                return Ok(RunOutcome::Completed);
            }

            if self.quota.remaining() == 0 && !self.pause(run, outstanding.len(), summary, cancel_token).await? {
                return Ok(RunOutcome::Cancelled);
            }
        }
    }

    /// Enter QUOTA_PAUSED and wait for the window to reset
    ///
    /// Returns `false` if the run was cancelled while waiting.
    async fn pause(
        &self,
        run: &mut ImportRun,
        sessions_remaining: usize,
        summary: &mut ImportSummary,
        cancel_token: &CancellationToken,
    ) -> ImportResult<bool> {
        self.transition(run, ImportPhase::QuotaPaused)?;
        summary.pauses += 1;

        let resume_in = self.quota.time_until_reset();
        tracing::warn!(
            resume_in_seconds = resume_in.as_secs(),
            resume_at = %(Utc::now() + chrono::Duration::seconds(resume_in.as_secs() as i64)),
            sessions_remaining,
            "Quota exhausted, pausing import"
        );
        self.event_bus.emit_lossy(ImportEvent::QuotaPaused {
            run_id: run.run_id,
            resume_in_seconds: resume_in.as_secs(),
            sessions_remaining,
            timestamp: Utc::now(),
        });

        tokio::select! {
            _ = cancel_token.cancelled() => {
                tracing::info!("Import cancelled while waiting for quota");
                return Ok(false);
            }
            _ = self.quota.await_reset() => {}
        }

        tracing::info!(sessions_remaining, "Quota available again, resuming import");
        self.event_bus.emit_lossy(ImportEvent::QuotaResumed {
            run_id: run.run_id,
            timestamp: Utc::now(),
        });
        Ok(true)
    }

    fn transition(&self, run: &mut ImportRun, to: ImportPhase) -> ImportResult<()> {
        let transition = run.transition_to(to)?;
        tracing::debug!(
            run_id = %run.run_id,
            from = %transition.old_phase,
            to = %transition.new_phase,
            "Phase transition"
        );
        self.event_bus.emit_lossy(ImportEvent::PhaseChanged {
            run_id: transition.run_id,
            old_phase: transition.old_phase,
            new_phase: transition.new_phase,
            timestamp: transition.transitioned_at,
        });
        Ok(())
    }

    fn emit_session_processed(&self, run: &ImportRun, result: &SessionResult) {
        self.event_bus.emit_lossy(ImportEvent::SessionProcessed {
            run_id: run.run_id,
            round_number: result.round_number,
            session_type: result.session_type.to_string(),
            session_number: result.session_number,
            status: result.status.as_str().to_string(),
            extracted: result.extracted.iter().map(|k| k.to_string()).collect(),
            failed: result.failed.iter().map(|k| k.to_string()).collect(),
            timestamp: Utc::now(),
        });
    }

    async fn deliver_failure(&self, year: i32, error: &ImportError) {
        if let Err(e) = self.notifier.notify_failed(year, &error.to_string()).await {
            tracing::warn!(year, error = %e, "Failure notification not delivered");
        }
    }
}
