//! Daemon configuration.
//!
//! Loaded from a TOML file (`--config`, or `<config_dir>/work-tracker/config.toml`
//! when present); every field has a default. `WT_SOCKET` and `WT_DB`
//! override the socket and database paths.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default socket path
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/wtd.sock";

/// Environment variable overriding the socket path
pub const SOCKET_ENV: &str = "WT_SOCKET";

/// Environment variable overriding the database path
pub const DATABASE_ENV: &str = "WT_DB";

const APP_DIR: &str = "work-tracker";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database holding events, summaries and app usage
    pub database_path: PathBuf,

    /// Unix socket for dashboard clients
    pub socket_path: PathBuf,

    pub tracker: TrackerConfig,
    pub focus: FocusConfig,
    pub summary: SummaryConfig,
    pub dashboard: DashboardConfig,
}

/// Activity event router settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub poll_interval_secs: u64,

    /// Lines of power history read per poll
    pub history_lines: usize,

    /// Maximum remembered history lines; 0 keeps every line ever seen
    pub seen_history_cap: usize,

    /// Timeout for each external command
    pub command_timeout_secs: u64,
}

/// Application focus tracker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusConfig {
    pub enabled: bool,
    pub poll_interval_secs: u64,

    /// Longest span credited to one app switch when computing usage
    pub max_sample_gap_secs: u64,
}

/// Periodic daily aggregation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub interval_secs: u64,
}

/// Dashboard read API and live update settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub broadcast_interval_secs: u64,
    pub summary_days: usize,
    pub recent_events: usize,
    pub usage_days: u32,
    pub top_apps: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            tracker: TrackerConfig::default(),
            focus: FocusConfig::default(),
            summary: SummaryConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            history_lines: 30,
            seen_history_cap: 0,
            command_timeout_secs: 5,
        }
    }
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 5,
            max_sample_gap_secs: 30 * 60,
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            broadcast_interval_secs: 15,
            summary_days: 30,
            recent_events: 50,
            usage_days: 30,
            top_apps: 10,
        }
    }
}

impl TrackerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl FocusConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_sample_gap(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.max_sample_gap_secs).unwrap_or(i64::MAX / 1000))
    }
}

impl SummaryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl DashboardConfig {
    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_secs(self.broadcast_interval_secs)
    }
}

impl Config {
    /// Loads configuration.
    ///
    /// An explicit `path` must exist. Without one, the default config file
    /// is read if present, otherwise defaults are used. Environment
    /// overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => Self::default(),
            },
        };

        config.apply_overrides(
            std::env::var_os(SOCKET_ENV).map(PathBuf::from),
            std::env::var_os(DATABASE_ENV).map(PathBuf::from),
        );
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parses TOML text. Missing fields take their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })
    }

    /// Replaces socket and database paths when overrides are given.
    pub fn apply_overrides(&mut self, socket: Option<PathBuf>, database: Option<PathBuf>) {
        if let Some(socket) = socket {
            self.socket_path = socket;
        }
        if let Some(database) = database {
            self.database_path = database;
        }
    }

    /// Rejects zero intervals and empty windows.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("tracker.poll_interval_secs", self.tracker.poll_interval_secs == 0),
            ("tracker.history_lines", self.tracker.history_lines == 0),
            ("tracker.command_timeout_secs", self.tracker.command_timeout_secs == 0),
            ("focus.poll_interval_secs", self.focus.poll_interval_secs == 0),
            ("summary.interval_secs", self.summary.interval_secs == 0),
            (
                "dashboard.broadcast_interval_secs",
                self.dashboard.broadcast_interval_secs == 0,
            ),
        ];

        match checks.iter().find(|(_, is_zero)| *is_zero) {
            Some((field, _)) => Err(ConfigError::Invalid(format!("{field} must be greater than 0"))),
            None => Ok(()),
        }
    }
}

/// `<config_dir>/work-tracker/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}

/// `<data_dir>/work-tracker/tracker.db`
pub fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(APP_DIR)
        .join("tracker.db")
}

/// `<state_dir>/work-tracker`, holding the PID and log files.
pub fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(APP_DIR)
}
