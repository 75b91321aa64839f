//! Runtime configuration.
//!
//! Settings come from an optional TOML file; every key may be omitted. The
//! binaries apply command-line overrides on top and then call
//! [`Config::validate`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sampler::SamplerConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Database file shared by the daemon and readers.
    pub db_path: PathBuf,
    /// Seconds between samples.
    pub poll_interval_seconds: u64,
    /// Maximum number of stored readings.
    pub retention_count: usize,
    /// Mount point measured for disk usage.
    pub disk_path: PathBuf,
    /// procfs root.
    pub proc_path: PathBuf,
    /// Seconds between database compactions; 0 disables them.
    pub compact_interval_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("/dev/shm/hoststat/history.sqlite3"),
            poll_interval_seconds: 1,
            retention_count: 300,
            disk_path: PathBuf::from("/"),
            proc_path: PathBuf::from("/proc"),
            compact_interval_seconds: 3600,
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_seconds must be at least 1".to_string(),
            ));
        }
        if self.retention_count == 0 {
            return Err(ConfigError::Invalid(
                "retention_count must be at least 1".to_string(),
            ));
        }
        if self.db_path.file_name().is_none() {
            return Err(ConfigError::Invalid(format!(
                "db_path {} does not name a file",
                self.db_path.display()
            )));
        }
        Ok(())
    }

    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            interval: Duration::from_secs(self.poll_interval_seconds),
            retention_count: self.retention_count,
            disk_path: self.disk_path.clone(),
            compact_interval: (self.compact_interval_seconds > 0)
                .then(|| Duration::from_secs(self.compact_interval_seconds)),
            ..SamplerConfig::default()
        }
    }
}
