use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{CronkeepError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/cronkeep/cronkeep.toml";
pub const DEFAULT_TABLE_PATH: &str = "/etc/cdcron";
pub const DEFAULT_METRICS_INTERVAL_SECS: u64 = 30; // metrics change about once a minute
pub const DEFAULT_METRICS_PREFIX: &str = "cdcron";

/// Top-level config (cronkeep.toml + CRONKEEP_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronkeepConfig {
    #[serde(default)]
    pub table: TableConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub clock: ClockConfig,
}

/// Where the job table lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default = "default_table_path")]
    pub path: PathBuf,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            path: default_table_path(),
        }
    }
}

impl TableConfig {
    /// Read the whole job table into memory.
    pub fn read(&self) -> Result<String> {
        std::fs::read_to_string(&self.path).map_err(|source| CronkeepError::TableRead {
            path: self.path.clone(),
            source,
        })
    }
}

/// How job command lines are turned into processes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// When set, every command line runs as `<shell> -c <line>`.
    /// When unset the line is split on whitespace and executed directly.
    #[serde(default)]
    pub shell: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// JSON report destination. Reports go to the log when unset.
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default = "default_metrics_prefix")]
    pub prefix: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_metrics_interval(),
            output: None,
            prefix: default_metrics_prefix(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Evaluate schedules against UTC instead of the host's local time.
    #[serde(default)]
    pub utc: bool,
}

fn default_table_path() -> PathBuf {
    PathBuf::from(DEFAULT_TABLE_PATH)
}
fn default_metrics_interval() -> u64 {
    DEFAULT_METRICS_INTERVAL_SECS
}
fn default_metrics_prefix() -> String {
    DEFAULT_METRICS_PREFIX.to_string()
}

impl CronkeepConfig {
    /// Load config from a TOML file with CRONKEEP_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. `CRONKEEP_CONFIG`
    ///   3. /etc/cronkeep/cronkeep.toml
    ///
    /// A missing file is not an error; every key has a default.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = config_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("CRONKEEP_CONFIG").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
        }

        Self::figment(&path)
            .extract()
            .map_err(|e| CronkeepError::Config(e.to_string()))
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CRONKEEP_").ignore(&["CONFIG"]).split("__"))
    }

    pub fn metrics_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.metrics.interval_secs.max(1))
    }
}
