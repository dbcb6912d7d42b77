//! Provider call quota
//!
//! Fixed-window counter: the window opens on the first call, closes
//! `window` later, and then resets in full. Between resets the ceiling is
//! a hard upper bound on calls; it is not a smooth rate.
//!
//! All counters live behind one mutex, so `consume` is atomic with respect
//! to concurrent callers and the ceiling is never exceeded, even briefly.

use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Interval between "still waiting" log lines during a pause
const WAIT_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Requested calls would exceed the ceiling
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Quota exceeded: requested {requested}, {remaining} remaining, resets in {}s", resets_in.as_secs())]
pub struct QuotaExceeded {
    pub requested: u32,
    pub remaining: u32,
    pub resets_in: Duration,
}

/// Coarse quota health, for logs and the stats snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuotaStatus {
    Ok,
    Warning,
    Exceeded,
}

/// Point-in-time view of the tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaStats {
    pub calls_made: u32,
    pub ceiling: u32,
    pub remaining: u32,
    pub resets_in_seconds: u64,
    pub status: QuotaStatus,
}

#[derive(Debug)]
struct QuotaWindow {
    calls_made: u32,
    /// `None` until the first call of a fresh window
    window_reset_at: Option<Instant>,
}

impl QuotaWindow {
    /// Reset counters once the window end has passed
    fn roll(&mut self, now: Instant) {
        if let Some(reset_at) = self.window_reset_at {
            if now >= reset_at {
                self.calls_made = 0;
                self.window_reset_at = None;
            }
        }
    }
}

/// Tracks provider calls against a fixed ceiling per window
#[derive(Debug)]
pub struct QuotaTracker {
    ceiling: u32,
    window: Duration,
    state: Mutex<QuotaWindow>,
}

impl QuotaTracker {
    pub fn new(ceiling: u32, window: Duration) -> Self {
        Self {
            ceiling,
            window,
            state: Mutex::new(QuotaWindow {
                calls_made: 0,
                window_reset_at: None,
            }),
        }
    }

    /// Tracker seeded with calls already spent in the current window
    ///
    /// `window_opened_ago` is the age of the oldest call in the window; the
    /// window closes `window - window_opened_ago` from now.
    pub fn with_usage(
        ceiling: u32,
        window: Duration,
        calls_made: u32,
        window_opened_ago: Duration,
    ) -> Self {
        let tracker = Self::new(ceiling, window);
        if calls_made > 0 && window_opened_ago < window {
            let mut state = tracker.lock();
            state.calls_made = calls_made.min(ceiling);
            state.window_reset_at = Some(Instant::now() + (window - window_opened_ago));
        }
        tracker
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QuotaWindow> {
        // counters stay consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Calls still available in the current window
    pub fn remaining(&self) -> u32 {
        let mut state = self.lock();
        state.roll(Instant::now());
        self.ceiling.saturating_sub(state.calls_made)
    }

    /// Calls spent in the current window
    pub fn calls_made(&self) -> u32 {
        let mut state = self.lock();
        state.roll(Instant::now());
        state.calls_made
    }

    /// Spend `n` calls, or fail without spending anything
    pub fn consume(&self, n: u32) -> Result<(), QuotaExceeded> {
        let now = Instant::now();
        let mut state = self.lock();
        state.roll(now);

        let remaining = self.ceiling.saturating_sub(state.calls_made);
        if n > remaining {
            return Err(QuotaExceeded {
                requested: n,
                remaining,
                resets_in: state
                    .window_reset_at
                    .map(|t| t.saturating_duration_since(now))
                    .unwrap_or(Duration::ZERO),
            });
        }

        if state.window_reset_at.is_none() && n > 0 {
            state.window_reset_at = Some(now + self.window);
        }
        state.calls_made += n;

        let left = self.ceiling - state.calls_made;
        if left == 0 {
            tracing::warn!(
                calls_made = state.calls_made,
                ceiling = self.ceiling,
                "Quota exhausted for current window"
            );
        } else if left < self.warning_threshold() {
            tracing::warn!(remaining = left, ceiling = self.ceiling, "Approaching quota ceiling");
        }

        Ok(())
    }

    /// Time until the current window closes (zero if no window is open)
    pub fn time_until_reset(&self) -> Duration {
        let now = Instant::now();
        let mut state = self.lock();
        state.roll(now);
        state
            .window_reset_at
            .map(|t| t.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Wait for the current window to close, then reset the counters
    ///
    /// Sleeps (never polls busily) and logs progress once a minute. Safe to
    /// drop mid-wait; the caller races it against its cancellation token.
    pub async fn await_reset(&self) {
        let window_reset_at = self.lock().window_reset_at;
        let Some(reset_at) = window_reset_at else {
            return;
        };

        let total = reset_at.saturating_duration_since(Instant::now());
        if !total.is_zero() {
            tracing::warn!(
                wait_seconds = total.as_secs(),
                "Quota reached, pausing until window resets"
            );
        }

        loop {
            let now = Instant::now();
            if now >= reset_at {
                break;
            }
            let step = (reset_at - now).min(WAIT_LOG_INTERVAL);
            tokio::time::sleep(step).await;

            let left = reset_at.saturating_duration_since(Instant::now());
            if !left.is_zero() {
                tracing::info!(minutes_left = left.as_secs() / 60, "Still waiting for quota reset");
            }
        }

        let mut state = self.lock();
        // a concurrent caller may already have rolled into a newer window
        if state.window_reset_at == Some(reset_at) {
            state.calls_made = 0;
            state.window_reset_at = None;
        }
        tracing::info!("Quota window reset, resuming");
    }

    pub fn stats(&self) -> QuotaStats {
        let now = Instant::now();
        let mut state = self.lock();
        state.roll(now);
        let remaining = self.ceiling.saturating_sub(state.calls_made);
        let status = if remaining == 0 {
            QuotaStatus::Exceeded
        } else if remaining < self.warning_threshold() {
            QuotaStatus::Warning
        } else {
            QuotaStatus::Ok
        };

        QuotaStats {
            calls_made: state.calls_made,
            ceiling: self.ceiling,
            remaining,
            resets_in_seconds: state
                .window_reset_at
                .map(|t| t.saturating_duration_since(now).as_secs())
                .unwrap_or(0),
            status,
        }
    }

    /// Below this many remaining calls the tracker warns (10% of ceiling)
    fn warning_threshold(&self) -> u32 {
        (self.ceiling / 10).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test(start_paused = true)]
    async fn test_consume_until_ceiling() {
        let tracker = QuotaTracker::new(3, HOUR);
        assert_eq!(tracker.remaining(), 3);
        assert_eq!(tracker.time_until_reset(), Duration::ZERO);

        tracker.consume(2).unwrap();
        assert_eq!(tracker.remaining(), 1);
        assert_eq!(tracker.time_until_reset(), HOUR);

        let err = tracker.consume(2).unwrap_err();
        assert_eq!(err.requested, 2);
        assert_eq!(err.remaining, 1);
        assert_eq!(tracker.remaining(), 1, "failed consume must not spend");

        tracker.consume(1).unwrap();
        assert_eq!(tracker.remaining(), 0);
        assert!(tracker.consume(1).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_in_full() {
        let tracker = QuotaTracker::new(2, HOUR);
        tracker.consume(2).unwrap();

        tokio::time::advance(HOUR - Duration::from_secs(1)).await;
        assert_eq!(tracker.remaining(), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(tracker.remaining(), 2);
        assert_eq!(tracker.time_until_reset(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_reset_sleeps_until_window_end() {
        let tracker = QuotaTracker::new(1, HOUR);
        tracker.consume(1).unwrap();

        let start = Instant::now();
        tracker.await_reset().await;

        assert!(start.elapsed() >= HOUR);
        assert_eq!(tracker.remaining(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_reset_without_open_window_returns_immediately() {
        let tracker = QuotaTracker::new(5, HOUR);
        let start = Instant::now();
        tracker.await_reset().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_usage_restores_partial_window() {
        let tracker = QuotaTracker::with_usage(10, HOUR, 4, Duration::from_secs(600));
        assert_eq!(tracker.remaining(), 6);
        assert_eq!(tracker.time_until_reset(), Duration::from_secs(3000));

        let stale = QuotaTracker::with_usage(10, HOUR, 4, HOUR * 2);
        assert_eq!(stale.remaining(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_status_levels() {
        let tracker = QuotaTracker::new(20, HOUR);
        assert_eq!(tracker.stats().status, QuotaStatus::Ok);

        tracker.consume(19).unwrap();
        let stats = tracker.stats();
        assert_eq!(stats.status, QuotaStatus::Warning);
        assert_eq!(stats.remaining, 1);
        assert_eq!(stats.resets_in_seconds, 3600);

        tracker.consume(1).unwrap();
        assert_eq!(tracker.stats().status, QuotaStatus::Exceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_consumers_never_exceed_ceiling() {
        let tracker = Arc::new(QuotaTracker::new(50, HOUR));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let tracker = Arc::clone(&tracker);
            handles.push(tokio::spawn(async move {
                let mut granted = 0u32;
                for _ in 0..20 {
                    if tracker.consume(1).is_ok() {
                        granted += 1;
                    }
                    tokio::task::yield_now().await;
                }
                granted
            }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }
        assert_eq!(total, 50);
        assert_eq!(tracker.remaining(), 0);
    }
}
