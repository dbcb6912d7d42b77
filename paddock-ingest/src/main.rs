//! paddock-ingest - season telemetry importer
//!
//! Runs one import for a season: detects what is missing in the local
//! store, fetches it within the provider's hourly quota (pausing when the
//! quota runs out), prints the summary and optionally posts it to Slack.

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use clap::Parser;
use paddock_common::config::{self as common_config, ROOT_FOLDER_ENV};
use paddock_common::events::EventBus;
use paddock_ingest::config::{CliOverrides, ImportConfig, ScheduleSetting};
use paddock_ingest::db::{self, api_calls, seasons, SessionStore, SqliteStore};
use paddock_ingest::services::{
    BatchPlanner, FileSchedule, HttpSchedule, HttpTelemetryProvider, ImportOrchestrator,
    LogNotifier, NotificationSink, QuotaTracker, ScheduleSource, SlackNotifier,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "paddock-ingest", version, about = "Gap-driven, quota-aware telemetry importer")]
struct Args {
    /// Season to import (defaults to the current year)
    #[arg(long)]
    year: Option<i32>,

    /// Only import gaps of this round
    #[arg(long)]
    round: Option<u32>,

    /// Re-extract every known session, even if already complete
    #[arg(long)]
    force: bool,

    /// Send the run summary to the notification sink
    #[arg(long)]
    notify: bool,

    /// Create the season row if it does not exist yet
    #[arg(long)]
    create_season: bool,

    /// Root folder holding the database
    #[arg(long)]
    root_folder: Option<PathBuf>,

    /// Config file (defaults to the user or system paddock config)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Telemetry provider base URL
    #[arg(long)]
    provider_url: Option<String>,

    /// Provider calls allowed per quota window
    #[arg(long)]
    quota_ceiling: Option<u32>,

    /// Read the expected schedule from this TOML file
    #[arg(long)]
    schedule_file: Option<PathBuf>,

    /// Calendar service base URL (not the telemetry provider)
    #[arg(long)]
    schedule_url: Option<String>,

    /// Upper bound on sessions per plan
    #[arg(long)]
    max_batch: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = common_config::load_config(args.config.as_deref()).context("Failed to load config file")?;

    let cli = CliOverrides {
        provider_url: args.provider_url.clone(),
        quota_ceiling: args.quota_ceiling,
        quota_window_seconds: None,
        slack_webhook_url: None,
        schedule_file: args.schedule_file.clone(),
        schedule_url: args.schedule_url.clone(),
        max_batch: args.max_batch,
    };
    let config = ImportConfig::resolve(&cli, &toml_config).context("Invalid configuration")?;

    let level = config.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("paddock_ingest={level},paddock_common={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting paddock-ingest {}", env!("CARGO_PKG_VERSION"));

    // Root folder and database
    let root_folder = common_config::resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, &toml_config);
    let db_path = common_config::prepare_root_folder(&root_folder).context("Failed to initialize root folder")?;
    info!("Database: {}", db_path.display());

    let pool = db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    let year = args.year.unwrap_or_else(|| Utc::now().year());
    if args.create_season {
        let season = seasons::ensure_season(&pool, year).await.context("Failed to create season")?;
        info!(year = season.year, "Season ready");
    }

    // Quota carries over from calls already logged in the current window
    let now = Utc::now();
    let usage = api_calls::window_usage(&pool, config.quota_window, now)
        .await
        .context("Failed to read provider call log")?;
    if usage.calls > 0 {
        info!(calls = usage.calls, "Restored quota usage from call log");
    }
    let quota = Arc::new(QuotaTracker::with_usage(
        config.quota_ceiling,
        config.quota_window,
        usage.calls,
        usage.opened_ago(now),
    ));

    let store: Arc<dyn SessionStore> = Arc::new(SqliteStore::new(pool, db::DEFAULT_MAX_LOCK_WAIT_MS));

    let provider = Arc::new(
        HttpTelemetryProvider::new(&config.provider_url, config.provider_timeout, config.requests_per_second)
            .context("Failed to create provider client")?,
    );
    info!(url = %provider.base_url(), "Telemetry provider configured");

    let schedule: Arc<dyn ScheduleSource> = match config.schedule_source().context("Invalid schedule source")? {
        ScheduleSetting::File(path) => {
            info!(path = %path.display(), "Using schedule file");
            Arc::new(FileSchedule::new(path))
        }
        ScheduleSetting::Url(url) => {
            let service =
                HttpSchedule::new(&url, config.provider_timeout).context("Failed to create schedule client")?;
            info!(url = %service.base_url(), "Using schedule service");
            Arc::new(service)
        }
    };

    let notifier: Arc<dyn NotificationSink> = match &config.slack_webhook_url {
        Some(url) => Arc::new(SlackNotifier::new(url.clone()).context("Failed to create Slack notifier")?),
        None => {
            if args.notify {
                warn!("--notify given but no Slack webhook configured, summary will only be logged");
            }
            Arc::new(LogNotifier)
        }
    };

    let orchestrator = ImportOrchestrator::new(store, schedule, provider, quota, notifier, EventBus::default())
        .with_planner(BatchPlanner::new(config.max_batch));

    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let summary = orchestrator
        .run_import(year, args.round, args.force, args.notify, &cancel_token)
        .await
        .with_context(|| format!("Import of season {} failed", year))?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM; the current session finishes first
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling after the current session");
        },
        _ = terminate => {
            info!("Received terminate signal, cancelling after the current session");
        },
    }
}
