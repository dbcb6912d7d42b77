//! Run summary notifications
//!
//! Delivery is best effort. The orchestrator logs a failed delivery and
//! carries on; a notification never changes the outcome of a run.

use crate::models::{ImportSummary, RunOutcome, SubDatasetKind};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Webhook rejected message: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Sink for terminal run summaries
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_completed(&self, summary: &ImportSummary) -> Result<(), NotificationError>;

    /// A run that aborted before producing a summary
    async fn notify_failed(&self, year: i32, error: &str) -> Result<(), NotificationError>;
}

fn field(label: &str, value: impl std::fmt::Display) -> Value {
    json!({"type": "mrkdwn", "text": format!("*{}:*\n{}", label, value)})
}

fn kind_label(kind: SubDatasetKind) -> &'static str {
    match kind {
        SubDatasetKind::Drivers => "Drivers",
        SubDatasetKind::Weather => "Weather",
        SubDatasetKind::Circuit => "Circuit",
        SubDatasetKind::Laps => "Laps",
    }
}

/// Slack incoming-webhook payload for a finished run
pub fn completion_message(summary: &ImportSummary) -> Value {
    let (headline, title) = match summary.outcome {
        RunOutcome::Completed => ("✅ Telemetry import complete", "Import complete"),
        RunOutcome::Cancelled => ("⚠️ Telemetry import cancelled", "Import cancelled"),
    };
    let scope = match summary.round_number {
        Some(round) => format!("*Season:* {}  *Round:* {}", summary.year, round),
        None => format!("*Season:* {}", summary.year),
    };

    let counts = vec![
        field("Sessions Processed", summary.sessions_processed),
        field("Succeeded", summary.succeeded),
        field("Partial", summary.partial),
        field("Failed", summary.failed),
        field("Calls Made", summary.calls_made),
        field("Quota Pauses", summary.pauses),
        field("Duration", format!("{:.1}s", summary.duration_seconds)),
    ];
    let kinds: Vec<Value> = SubDatasetKind::ALL
        .iter()
        .map(|kind| field(kind_label(*kind), summary.kind_count(*kind)))
        .collect();

    json!({
        "text": format!("{} - Season {}", headline, summary.year),
        "blocks": [
            {"type": "section", "text": {"type": "mrkdwn", "text": format!("*{}*\n{}", title, scope)}},
            {"type": "section", "fields": counts},
            {"type": "section", "fields": kinds},
        ]
    })
}

/// Slack incoming-webhook payload for an aborted run
pub fn failure_message(year: i32, error: &str) -> Value {
    json!({
        "text": format!("❌ Telemetry import failed - Season {}", year),
        "blocks": [
            {
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!("*Import failed*\n*Season:* {}\n*Error:* {}", year, error)
                }
            }
        ]
    })
}

/// Posts summaries to a Slack incoming webhook
pub struct SlackNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl SlackNotifier {
    pub fn new(webhook_url: impl Into<String>) -> paddock_common::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| paddock_common::Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }

    async fn post(&self, payload: &Value) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(payload)
            .send()
            .await
            .map_err(|e| NotificationError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!("Slack notification sent");
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for SlackNotifier {
    async fn notify_completed(&self, summary: &ImportSummary) -> Result<(), NotificationError> {
        self.post(&completion_message(summary)).await
    }

    async fn notify_failed(&self, year: i32, error: &str) -> Result<(), NotificationError> {
        self.post(&failure_message(year, error)).await
    }
}

/// Sink used when no webhook is configured: writes the summary to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify_completed(&self, summary: &ImportSummary) -> Result<(), NotificationError> {
        tracing::info!(
            year = summary.year,
            outcome = ?summary.outcome,
            sessions_processed = summary.sessions_processed,
            succeeded = summary.succeeded,
            partial = summary.partial,
            failed = summary.failed,
            calls_made = summary.calls_made,
            "No webhook configured, import summary logged only"
        );
        Ok(())
    }

    async fn notify_failed(&self, year: i32, error: &str) -> Result<(), NotificationError> {
        tracing::warn!(year, error, "No webhook configured, import failure logged only");
        Ok(())
    }
}
