//! Configuration management for logkeep
//!
//! Settings are layered, lowest priority first:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables
//!
//! # Environment Variables
//!
//! Any key can be overridden with `LOGKEEP__<section>__<key>`:
//! - `LOGKEEP__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `LOGKEEP__RETENTION__MAX_SIZE=200MB`
//! - `LOGKEEP__QUOTA__TOTAL=1GB`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/logkeep.toml`.
//! This can be overridden using the `LOGKEEP_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    Config, IngestConfig, QuotaConfig, RetentionConfig, ServerConfig, SessionsConfig,
    TelemetryConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
