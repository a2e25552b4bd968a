use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::model::{CheckFrequency, DependencyRecord, MonitoringSettings};

// =============================================================================
// Time-related constants
// =============================================================================

/// Timeout for a single outbound request in milliseconds (30 seconds)
pub const FETCH_TIMEOUT_MS: u64 = 30_000;

/// Default deadline for a whole monitor pass in milliseconds (5 minutes)
pub const DEFAULT_TIMEOUT_MS: u64 = 5 * 60 * 1000;

/// Default number of checks in flight
pub const DEFAULT_CONCURRENCY: usize = 8;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("depwatch/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";
pub const DEFAULT_DOCS_API: &str = "https://context7.com/api";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Monitor configuration structure
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitorConfig {
    /// Defaults applied to every dependency
    pub monitoring: MonitoringSettings,
    /// Per-URL overrides, applied in declaration order
    pub overrides: IndexMap<String, MonitoringOverride>,
    pub rate_limit: RateLimitConfig,
    pub concurrency: usize,
    /// Deadline for a whole pass; 0 disables it
    pub timeout_ms: u64,
    /// How long a check may wait for an exhausted quota to reset; 0 fails it
    pub max_quota_wait_ms: u64,
    pub endpoints: EndpointsConfig,
    pub github_token: Option<String>,
    pub log: LogConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            monitoring: MonitoringSettings::default(),
            overrides: IndexMap::new(),
            rate_limit: RateLimitConfig::default(),
            concurrency: DEFAULT_CONCURRENCY,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_quota_wait_ms: 0,
            endpoints: EndpointsConfig::default(),
            github_token: None,
            log: LogConfig::default(),
        }
    }
}

/// Partial monitoring settings for one URL
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitoringOverride {
    pub enabled: Option<bool>,
    pub check_frequency: Option<CheckFrequency>,
    pub ignore_changes: Option<bool>,
}

impl MonitoringOverride {
    fn apply(&self, settings: &mut MonitoringSettings) {
        if let Some(enabled) = self.enabled {
            settings.enabled = enabled;
        }
        if let Some(frequency) = self.check_frequency {
            settings.check_frequency = frequency;
        }
        if let Some(ignore) = self.ignore_changes {
            settings.ignore_changes = ignore;
        }
    }
}

/// Thresholds for the shared API quota
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// Log a warning once remaining quota drops to this value
    pub warning_threshold: u32,
    /// Refuse quota-consuming checks at or below this value until reset
    pub min_remaining: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            warning_threshold: 100,
            min_remaining: 10,
        }
    }
}

/// Base URLs of the external services
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct EndpointsConfig {
    pub github_api: String,
    pub docs_api: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            github_api: DEFAULT_GITHUB_API.to_string(),
            docs_api: DEFAULT_DOCS_API.to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LogConfig {
    /// Default filter directive, overridden by RUST_LOG
    pub level: String,
    /// Write to a daily-rolling file instead of stderr
    pub file: Option<PathBuf>,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "depwatch=info".to_string(),
            file: None,
            json: false,
        }
    }
}

impl MonitorConfig {
    /// Loads the config from a JSON file. Missing fields use defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Loads the config if the file exists, otherwise returns defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Monitoring settings for a new dependency at `url`: global defaults
    /// merged with matching overrides
    pub fn effective_monitoring(&self, url: &str) -> MonitoringSettings {
        let mut settings = self.monitoring.clone();
        self.apply_matching(url, &mut settings);
        settings
    }

    /// Applies matching overrides on top of the record's stored settings
    pub fn apply_overrides(&self, record: &mut DependencyRecord) {
        self.apply_matching(&record.url, &mut record.monitoring);
    }

    fn apply_matching(&self, url: &str, settings: &mut MonitoringSettings) {
        for (pattern, over) in &self.overrides {
            if url_matches(pattern, url) {
                over.apply(settings);
            }
        }
    }

    /// Token from the config file, falling back to GITHUB_TOKEN
    pub fn github_token(&self) -> Option<String> {
        self.github_token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|token| !token.is_empty())
    }
}

/// An override key matches the URL itself or any URL below it
fn url_matches(pattern: &str, url: &str) -> bool {
    let pattern = pattern.trim_end_matches('/');
    let url = url.trim_end_matches('/');
    url == pattern
        || url
            .strip_prefix(pattern)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Returns the path to the data directory for depwatch.
/// Uses $XDG_DATA_HOME/depwatch if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/depwatch,
/// or ./depwatch if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the manifest database.
pub fn db_path() -> PathBuf {
    data_dir().join("depwatch.db")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("depwatch.log")
}

/// Returns the default config file location.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("depwatch")
        .join("config.json")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("depwatch")
}
