//! Configuration file parser for `sport-news.toml`.
//!
//! The config file is optional. A missing file yields `Config::default()`,
//! and `SPORT_NEWS_*` environment variables override whatever was loaded.
//! Unknown keys are accepted by serde but logged as potential typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::sync::SyncSettings;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// Every section uses `#[serde(default)]` so any subset of keys can be given.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feed: FeedConfig,
    pub storage: StorageConfig,
    /// Default tracing filter when `RUST_LOG` is not set.
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// When false the sync job is never scheduled.
    pub enabled: bool,
    pub base_url: String,
    /// Page size requested from the list feed.
    pub count: u32,
    pub interval_secs: u64,
    /// Deadline for a whole run.
    pub run_timeout_secs: u64,
    /// Part of the run deadline reserved for the insert.
    pub persist_reserve_secs: u64,
    pub request_timeout_secs: u64,
    pub max_in_flight: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            storage: StorageConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        let sync = SyncSettings::default();
        Self {
            enabled: true,
            base_url: "https://www.htafc.com/api/incrowd".to_string(),
            count: sync.count,
            interval_secs: 30,
            run_timeout_secs: sync.run_timeout.as_secs(),
            persist_reserve_secs: sync.persist_reserve.as_secs(),
            request_timeout_secs: 20,
            max_in_flight: sync.max_in_flight,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("sport-news.db"),
        }
    }
}

const KNOWN_TOP_LEVEL: [&str; 3] = ["feed", "storage", "log_level"];
const KNOWN_FEED: [&str; 8] = [
    "enabled",
    "base_url",
    "count",
    "interval_secs",
    "run_timeout_secs",
    "persist_reserve_secs",
    "request_timeout_secs",
    "max_in_flight",
];
const KNOWN_STORAGE: [&str; 1] = ["database_path"];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check size before reading so a huge file never lands in memory
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw);
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            base_url = %config.feed.base_url,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Apply `SPORT_NEWS_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("SPORT_NEWS_FEED_URL") {
            self.feed.base_url = url;
        }
        if let Some(count) = get("SPORT_NEWS_FEED_COUNT") {
            self.feed.count = parse_env("SPORT_NEWS_FEED_COUNT", &count)?;
        }
        if let Some(secs) = get("SPORT_NEWS_INTERVAL_SECS") {
            self.feed.interval_secs = parse_env("SPORT_NEWS_INTERVAL_SECS", &secs)?;
        }
        if let Some(path) = get("SPORT_NEWS_DATABASE") {
            self.storage.database_path = PathBuf::from(path);
        }
        if let Some(level) = get("SPORT_NEWS_LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    /// Reject values the synchronizer cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let parsed =
            url::Url::parse(&self.feed.base_url).map_err(|e| ConfigError::InvalidValue {
                key: "feed.base_url",
                reason: e.to_string(),
            })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                key: "feed.base_url",
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let non_zero = [
            ("feed.count", self.feed.count as u64),
            ("feed.interval_secs", self.feed.interval_secs),
            ("feed.run_timeout_secs", self.feed.run_timeout_secs),
            ("feed.request_timeout_secs", self.feed.request_timeout_secs),
            ("feed.max_in_flight", self.feed.max_in_flight as u64),
        ];
        for (key, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.feed.persist_reserve_secs >= self.feed.run_timeout_secs {
            return Err(ConfigError::InvalidValue {
                key: "feed.persist_reserve_secs",
                reason: format!(
                    "must be less than feed.run_timeout_secs ({})",
                    self.feed.run_timeout_secs
                ),
            });
        }
        Ok(())
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            count: self.feed.count,
            run_timeout: Duration::from_secs(self.feed.run_timeout_secs),
            max_in_flight: self.feed.max_in_flight,
            persist_reserve: Duration::from_secs(self.feed.persist_reserve_secs),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.feed.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.feed.request_timeout_secs)
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key,
            reason: format!("'{}': {}", value, e),
        })
}

fn warn_unknown_keys(raw: &toml::Table) {
    for (key, value) in raw {
        let nested: Option<&[&str]> = match key.as_str() {
            "feed" => Some(&KNOWN_FEED[..]),
            "storage" => Some(&KNOWN_STORAGE[..]),
            _ => None,
        };
        if !KNOWN_TOP_LEVEL.contains(&key.as_str()) {
            tracing::warn!(key = %key, "Unknown key in config file, ignoring");
            continue;
        }
        if let (Some(known), Some(table)) = (nested, value.as_table()) {
            for sub in table.keys() {
                if !known.contains(&sub.as_str()) {
                    tracing::warn!(key = %format!("{}.{}", key, sub), "Unknown key in config file, ignoring");
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
