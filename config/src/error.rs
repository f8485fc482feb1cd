//! Error types for configuration loading.
//!
//! Provides a unified error type covering I/O, serialization, and
//! configuration validation failures.

use coredata_core::ValidationError;
use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Configuration values are out of range or inconsistent.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// An entity descriptor failed validation.
    #[error("invalid entity: {0}")]
    InvalidEntity(#[from] ValidationError),
}

/// Convenience alias for results with [`ConfigError`].
pub type Result<T> = std::result::Result<T, ConfigError>;
