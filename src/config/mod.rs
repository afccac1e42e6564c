//! Layered configuration for exports.
//!
//! Configuration is loaded with precedence: caller overrides > Env vars > Config file > Defaults
//!
//! # Example config file (dss-export.toml)
//! ```toml
//! concurrency = 16
//! min_batch_size = 50000
//! write_property = "component"
//!
//! [storage]
//! path = "/var/lib/dss-export"
//! create_if_missing = true
//! ```
//!
//! Nested keys are set from the environment with a double underscore, e.g.
//! `DSS_EXPORT_STORAGE__PATH=/tmp/db`.

mod defaults;

pub use defaults::*;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main export configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Number of export workers
    pub concurrency: usize,
    /// Smallest partition handed to a worker
    pub min_batch_size: usize,
    /// Property key written on every node
    pub write_property: String,
    /// Log progress while exporting
    pub progress_logging: bool,
    /// Node store settings
    pub storage: StorageConfig,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            min_batch_size: DEFAULT_MIN_BATCH_SIZE,
            write_property: DEFAULT_WRITE_PROPERTY.to_string(),
            progress_logging: true,
            storage: StorageConfig::default(),
        }
    }
}

impl ExportConfig {
    /// Load configuration with precedence: overrides > Env > File > Defaults
    ///
    /// # Arguments
    /// * `config_path` - Optional path to TOML config file
    /// * `overrides` - Caller overrides to apply on top
    pub fn load(
        config_path: Option<&str>,
        overrides: ExportOverrides,
    ) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(ExportConfig::default()));

        // Layer 1: Config file (if provided)
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Layer 2: Environment variables with DSS_EXPORT_ prefix
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        // Layer 3: caller overrides
        figment = figment.merge(Serialized::defaults(overrides));

        let config: ExportConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment and optional config file only (no overrides)
    pub fn from_env(config_path: Option<&str>) -> Result<Self, ConfigError> {
        Self::load(config_path, ExportOverrides::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::new("concurrency must be at least 1"));
        }
        if self.write_property.trim().is_empty() {
            return Err(ConfigError::new("write_property must not be empty"));
        }
        Ok(())
    }
}

/// Node store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// RocksDB directory opened by `RocksNodeStore::from_config`
    pub path: Option<PathBuf>,
    /// Create the database if it does not exist
    pub create_if_missing: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            create_if_missing: true,
        }
    }
}

/// Overrides that take precedence over file and env config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_property: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_logging: Option<bool>,
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}
