//! Error types for the settings crate.

use std::io;
use thiserror::Error;

/// Errors that can occur while loading or saving settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The configuration file could not be read.
    #[error("Failed to load settings from {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The configuration file could not be written.
    #[error("Failed to save settings to {path}: {source}")]
    Save {
        path: String,
        #[source]
        source: io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// A configuration validation error occurred.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors related to configuration validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration file format is not supported.
    #[error("Unsupported config format: {0} (expected .toml or .json)")]
    UnsupportedFormat(String),

    /// A configuration value is out of its valid range.
    #[error("Value out of range for '{key}': {value}")]
    ValueOutOfRange { key: String, value: String },

    /// The platform has no configuration directory.
    #[error("No configuration directory on this platform")]
    NoConfigDirectory,
}

impl ConfigError {
    pub(crate) fn out_of_range(key: &str, value: impl ToString) -> Self {
        Self::ValueOutOfRange {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
