//! Application configuration loaded from TOML.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) yields a working configuration:
//!
//! ```toml
//! [tracker]
//! max_match_distance = 100.0
//! max_missed_frames = 30
//!
//! [zones]
//! debounce_frames = 3
//!
//! [aggregation]
//! bucket_granularity_secs = 60
//! clamp_occupancy_at_zero = true
//!
//! [forecast]
//! alpha = 0.3
//! beta = 0.05
//!
//! [repository]
//! type = "local"
//! ```

use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::aggregation::AggregationConfig;
use crate::db::{RepositoryError, RepositoryType};
use crate::services::forecasting::ForecastConfig;
use crate::tracking::TrackerConfig;
use crate::zones::ZoneConfig;

/// Environment variable pointing at a config file.
pub const CONFIG_ENV_VAR: &str = "ZONECOUNT_CONFIG";

const MAX_HISTORY_BUCKETS: usize = 100_000;
const MAX_RETENTION_SECS: u64 = 100 * 365 * 86_400;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No zonecount.toml found in standard locations")]
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySettings {
    #[serde(rename = "type", default = "default_repo_type")]
    pub repo_type: String,
}

fn default_repo_type() -> String {
    "local".to_string()
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            repo_type: default_repo_type(),
        }
    }
}

impl RepositorySettings {
    pub fn repository_type(&self) -> Result<RepositoryType, RepositoryError> {
        RepositoryType::from_str(&self.repo_type).map_err(RepositoryError::configuration)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub zones: ZoneConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub repository: RepositorySettings,
}

impl AppConfig {
    /// Parse and validate a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Searches for `zonecount.toml` in:
    /// 1. Current directory
    /// 2. `backend/` directory
    /// 3. Parent directory
    pub fn from_default_location() -> Result<Self, ConfigError> {
        let search_paths = [
            PathBuf::from("zonecount.toml"),
            PathBuf::from("backend/zonecount.toml"),
            PathBuf::from("../zonecount.toml"),
        ];

        for path in search_paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(ConfigError::NotFound)
    }

    /// `$ZONECOUNT_CONFIG` if set, then the default locations, then the
    /// built-in defaults. A file that exists but does not parse or validate
    /// is an error.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            info!("Loading configuration from {}", path);
            return Self::from_file(path);
        }
        match Self::from_default_location() {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound) => {
                info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid(msg.to_string()))
        };

        let t = &self.tracker;
        if !(t.max_match_distance.is_finite() && t.max_match_distance > 0.0) {
            return invalid("tracker.max_match_distance must be a positive number");
        }
        if !(0.0..=1.0).contains(&t.min_confidence) {
            return invalid("tracker.min_confidence must be within [0, 1]");
        }

        if self.zones.debounce_frames == 0 {
            return invalid("zones.debounce_frames must be at least 1");
        }

        let a = &self.aggregation;
        if a.bucket_granularity_secs == 0 {
            return invalid("aggregation.bucket_granularity_secs must be positive");
        }
        if a.live_window_secs < u64::from(a.bucket_granularity_secs) {
            return invalid("aggregation.live_window_secs must cover at least one bucket");
        }
        if a.retention_secs < u64::from(a.bucket_granularity_secs) {
            return invalid("aggregation.retention_secs must cover at least one bucket");
        }
        if a.retention_secs > MAX_RETENTION_SECS {
            return invalid("aggregation.retention_secs must not exceed 100 years");
        }
        if a.live_window_secs > a.retention_secs {
            return invalid("aggregation.live_window_secs must not exceed retention_secs");
        }

        let f = &self.forecast;
        let unit = |v: f64| v > 0.0 && v <= 1.0;
        if !unit(f.alpha) || !unit(f.beta) {
            return invalid("forecast.alpha and forecast.beta must be within (0, 1]");
        }
        if !(f.confidence_z.is_finite() && f.confidence_z >= 0.0) {
            return invalid("forecast.confidence_z must be a non-negative number");
        }
        if f.max_periods == 0 {
            return invalid("forecast.max_periods must be positive");
        }
        if f.history_buckets > MAX_HISTORY_BUCKETS {
            return invalid("forecast.history_buckets is too large");
        }
        if f.history_buckets < f.min_history {
            return invalid("forecast.history_buckets must be at least forecast.min_history");
        }

        self.repository
            .repository_type()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }
}
