//! Configuration types for tsmeta
//!
//! This module defines configuration structures used across components.
//! Every field has a default so partial TOML files are accepted.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration for tsmeta
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Metadata store configuration
    #[serde(default)]
    pub store: MetaStoreConfig,
    /// Schema cache configuration
    #[serde(default)]
    pub schema_cache: SchemaCacheConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from a TOML file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(String),
}

/// Metadata store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetaStoreConfig {
    /// Directory holding the schema database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Database file name inside `data_dir`
    #[serde(default = "default_db_file")]
    pub db_file: String,
    /// Page cache size of the embedded engine (default: 64 MB)
    #[serde(default = "default_db_cache_bytes")]
    pub db_cache_bytes: usize,
    /// Depth (root = 0) at which a storage group is declared implicitly
    /// when a timeseries is created without one. `None` disables this.
    #[serde(default)]
    pub auto_storage_group_level: Option<usize>,
    /// TTL given to implicitly declared storage groups
    #[serde(default)]
    pub default_ttl: Option<u64>,
}

impl Default for MetaStoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_file: default_db_file(),
            db_cache_bytes: default_db_cache_bytes(),
            auto_storage_group_level: None,
            default_ttl: None,
        }
    }
}

impl MetaStoreConfig {
    /// Create config with data directory
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Full path of the database file
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }
}

/// Schema cache configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchemaCacheConfig {
    /// Upper bound on the summed entry weight (default: 128 MB)
    #[serde(default = "default_max_weight_bytes")]
    pub max_weight_bytes: u64,
}

impl Default for SchemaCacheConfig {
    fn default() -> Self {
        Self {
            max_weight_bytes: default_max_weight_bytes(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./tsmeta-data")
}

fn default_db_file() -> String {
    "schema.redb".to_string()
}

const fn default_db_cache_bytes() -> usize {
    64 * 1024 * 1024
}

const fn default_max_weight_bytes() -> u64 {
    128 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}
