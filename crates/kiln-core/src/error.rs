//! Error types for Kiln

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Main error type for core operations
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Value conversion errors
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while translating between native values and literals
#[derive(Debug, Error)]
pub enum ConversionError {
    /// A value was supplied for a name the interface does not declare
    #[error("Unknown input '{0}'")]
    UnknownInput(String),

    /// The interface declares an input that was not supplied
    #[error("Missing input '{0}'")]
    MissingInput(String),

    /// Value shape does not match the declared type
    #[error("Expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// Value has the right shape but cannot be represented
    #[error("Invalid {kind} value: {reason}")]
    InvalidValue { kind: String, reason: String },
}

impl ConversionError {
    pub(crate) fn mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub(crate) fn invalid(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            kind: kind.into(),
            reason: reason.into(),
        }
    }
}
