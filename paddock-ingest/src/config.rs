//! Configuration resolution for paddock-ingest
//!
//! Each setting resolves CLI → ENV → TOML → default. The resolved values are
//! validated once, at start-up.

use paddock_common::config::TomlConfig;
use paddock_common::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub const QUOTA_CEILING_ENV: &str = "PADDOCK_QUOTA_CEILING";
pub const QUOTA_WINDOW_ENV: &str = "PADDOCK_QUOTA_WINDOW_SECONDS";
pub const PROVIDER_URL_ENV: &str = "PADDOCK_PROVIDER_URL";
pub const SLACK_WEBHOOK_ENV: &str = "PADDOCK_SLACK_WEBHOOK_URL";
pub const SCHEDULE_URL_ENV: &str = "PADDOCK_SCHEDULE_URL";

pub const DEFAULT_PROVIDER_URL: &str = "http://localhost:8000/api";

/// Values given on the command line; `None` defers to the next tier
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub provider_url: Option<String>,
    pub quota_ceiling: Option<u32>,
    pub quota_window_seconds: Option<u64>,
    pub slack_webhook_url: Option<String>,
    pub schedule_file: Option<PathBuf>,
    pub schedule_url: Option<String>,
    pub max_batch: Option<usize>,
}

/// Where the expected season schedule comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleSetting {
    File(PathBuf),
    Url(String),
}

/// Fully resolved importer settings
#[derive(Debug, Clone, PartialEq)]
pub struct ImportConfig {
    pub provider_url: String,
    pub provider_timeout: Duration,
    pub requests_per_second: u32,
    pub quota_ceiling: u32,
    pub quota_window: Duration,
    pub max_batch: Option<usize>,
    pub slack_webhook_url: Option<String>,
    pub schedule_file: Option<PathBuf>,
    pub schedule_url: Option<String>,
    pub log_level: String,
}

/// Read and parse an environment variable; unset or blank means `None`
fn env_value<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}='{}' is invalid: {}", name, raw, e))),
        _ => Ok(None),
    }
}

/// First present tier wins; logs which tier supplied the value
fn pick<T>(setting: &str, cli: Option<T>, env: Option<T>, toml: Option<T>, default: T) -> T {
    if let Some(v) = cli {
        debug!(setting, "Using command-line value");
        return v;
    }
    if let Some(v) = env {
        info!(setting, "Using value from environment variable");
        return v;
    }
    if let Some(v) = toml {
        debug!(setting, "Using value from TOML config");
        return v;
    }
    default
}

impl ImportConfig {
    pub fn resolve(cli: &CliOverrides, toml_config: &TomlConfig) -> Result<Self> {
        let defaults = TomlConfig::default();

        let provider_url = pick(
            "provider_url",
            cli.provider_url.clone(),
            env_value::<String>(PROVIDER_URL_ENV)?,
            toml_config.provider.base_url.clone(),
            DEFAULT_PROVIDER_URL.to_string(),
        );

        let quota_ceiling = pick(
            "quota_ceiling",
            cli.quota_ceiling,
            env_value::<u32>(QUOTA_CEILING_ENV)?,
            Some(toml_config.quota.ceiling),
            defaults.quota.ceiling,
        );

        let window_seconds = pick(
            "quota_window_seconds",
            cli.quota_window_seconds,
            env_value::<u64>(QUOTA_WINDOW_ENV)?,
            Some(toml_config.quota.window_seconds),
            defaults.quota.window_seconds,
        );

        let slack_webhook_url = pick(
            "slack_webhook_url",
            cli.slack_webhook_url.clone().map(Some),
            env_value::<String>(SLACK_WEBHOOK_ENV)?.map(Some),
            Some(toml_config.notifications.slack_webhook_url.clone()),
            None,
        )
        .filter(|url| !url.trim().is_empty());

        let schedule_url = pick(
            "schedule_url",
            cli.schedule_url.clone().map(Some),
            env_value::<String>(SCHEDULE_URL_ENV)?.map(Some),
            Some(toml_config.schedule.url.clone()),
            None,
        )
        .map(|url| url.trim().trim_end_matches('/').to_string())
        .filter(|url| !url.is_empty());

        let config = Self {
            provider_url: provider_url.trim().trim_end_matches('/').to_string(),
            provider_timeout: Duration::from_secs(toml_config.provider.timeout_seconds),
            requests_per_second: toml_config.provider.requests_per_second,
            quota_ceiling,
            quota_window: Duration::from_secs(window_seconds),
            max_batch: cli.max_batch.or(toml_config.planner.max_batch),
            slack_webhook_url,
            schedule_file: cli.schedule_file.clone().or_else(|| toml_config.schedule.file.clone()),
            schedule_url,
            log_level: toml_config.logging.level.clone(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.quota_ceiling == 0 {
            return Err(Error::Config("Quota ceiling must be at least 1 call".to_string()));
        }
        if self.quota_window < Duration::from_secs(1) {
            return Err(Error::Config("Quota window must be at least 1 second".to_string()));
        }
        if self.provider_url.is_empty() {
            return Err(Error::Config("Provider URL must not be empty".to_string()));
        }
        if self.provider_timeout.is_zero() {
            return Err(Error::Config("Provider timeout must be at least 1 second".to_string()));
        }
        if self.max_batch == Some(0) {
            return Err(Error::Config("planner.max_batch must be at least 1 when set".to_string()));
        }
        Ok(())
    }

    /// The configured schedule source; a file wins over a URL
    ///
    /// Schedule requests are not counted against the provider quota, so the
    /// schedule must come from a file or a separate calendar service.
    pub fn schedule_source(&self) -> Result<ScheduleSetting> {
        match (&self.schedule_file, &self.schedule_url) {
            (Some(path), _) => Ok(ScheduleSetting::File(path.clone())),
            (None, Some(url)) => {
                if url.starts_with(&self.provider_url) {
                    return Err(Error::Config(format!(
                        "Schedule URL {} is served by the telemetry provider; use a schedule file or a separate calendar service",
                        url
                    )));
                }
                Ok(ScheduleSetting::Url(url.clone()))
            }
            (None, None) => Err(Error::Config(
                "No schedule source configured: set schedule.file or schedule.url".to_string(),
            )),
        }
    }
}
