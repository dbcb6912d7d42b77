//! Configuration loading and root folder resolution
//!
//! Every setting resolves in the same order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "PADDOCK_ROOT_FOLDER";

/// SQLite file name inside the root folder
pub const DATABASE_FILE: &str = "paddock.db";

/// Contents of `config.toml`
///
/// Missing tables and keys fall back to their defaults, so an empty file is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<String>,
    pub logging: LoggingConfig,
    pub provider: ProviderConfig,
    pub quota: QuotaConfig,
    pub planner: PlannerConfig,
    pub notifications: NotificationConfig,
    pub schedule: ScheduleConfig,
}

/// `[logging]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level applied to the paddock crates when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// `[provider]` table: the remote telemetry service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: Option<String>,
    pub timeout_seconds: u64,
    /// Short-term request spacing, independent of the hourly quota
    pub requests_per_second: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_seconds: 60,
            requests_per_second: 2,
        }
    }
}

/// `[quota]` table: hard call ceiling per fixed window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub ceiling: u32,
    pub window_seconds: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            ceiling: 500,
            window_seconds: 3600,
        }
    }
}

/// `[planner]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Upper bound on sessions per plan, on top of the quota bound
    pub max_batch: Option<usize>,
}

/// `[notifications]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub slack_webhook_url: Option<String>,
}

/// `[schedule]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Local calendar file; takes precedence over `url`
    pub file: Option<PathBuf>,
    /// Calendar service base URL, separate from the quota-limited provider
    pub url: Option<String>,
}

/// Resolve the root folder (CLI → ENV → TOML → OS default)
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_config: &TomlConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = toml_config.root_folder.as_deref() {
        return PathBuf::from(path);
    }

    default_root_folder()
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("paddock"))
        .unwrap_or_else(|| PathBuf::from("./paddock_data"))
}

/// Locate the default config file, if one exists
///
/// Checks the user config dir first, then `/etc/paddock/config.toml` on Linux.
pub fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("paddock").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/paddock/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load the config file named on the command line, or the default one
///
/// An explicitly named file must exist. Without one, a missing default file
/// yields `TomlConfig::default()`.
pub fn load_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    match explicit {
        Some(path) => load_toml_config(path),
        None => match default_config_path() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading config file");
                load_toml_config(&path)
            }
            None => Ok(TomlConfig::default()),
        },
    }
}

/// Create the root folder if missing and return the database path inside it
pub fn prepare_root_folder(root_folder: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(root_folder)?;
    Ok(root_folder.join(DATABASE_FILE))
}
