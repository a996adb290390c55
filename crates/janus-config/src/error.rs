//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// Failed to read a configuration file.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to read a `.env` file.
    #[error("failed to read dotenv file {path}: {reason}")]
    DotenvError {
        /// Path to the file.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML configuration: {0}")]
    TomlError(#[from] toml::de::Error),

    /// JSON parsing error.
    #[error("failed to parse JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Unknown key in a configuration source.
    #[error("unknown configuration field: {field} in section {section}")]
    UnknownField {
        /// The unknown field name.
        field: String,
        /// The section containing the field.
        section: String,
    },

    /// Invalid configuration value.
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// The field with the invalid value.
        field: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// A field required by another setting is missing.
    #[error("missing required configuration field: {field}")]
    MissingField {
        /// The missing field name.
        field: String,
    },

    /// Environment variable parsing error.
    #[error("failed to parse environment variable {var}: {reason}")]
    EnvParseError {
        /// The environment variable name.
        var: String,
        /// Why parsing failed.
        reason: String,
    },

    /// Validation error after loading.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

impl ConfigError {
    /// Creates a file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates a read error.
    pub fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    /// Creates a dotenv error.
    pub fn dotenv_error(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::DotenvError {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates an unknown field error.
    pub fn unknown_field(field: impl Into<String>, section: impl Into<String>) -> Self {
        Self::UnknownField {
            field: field.into(),
            section: section.into(),
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates an environment variable parse error.
    pub fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_not_found_error() {
        let err = ConfigError::file_not_found("/etc/janus/gateway.toml");
        assert!(err.to_string().contains("/etc/janus/gateway.toml"));
    }

    #[test]
    fn test_unknown_field_error() {
        let err = ConfigError::unknown_field("TTL", "CACHE");
        assert_eq!(
            err.to_string(),
            "unknown configuration field: TTL in section CACHE"
        );
    }

    #[test]
    fn test_env_parse_error() {
        let err = ConfigError::env_parse_error("JANUS__TIMER__ENABLED", "expected boolean");
        assert!(err.to_string().contains("JANUS__TIMER__ENABLED"));
        assert!(err.to_string().contains("expected boolean"));
    }

    #[test]
    fn test_missing_field_error() {
        let err = ConfigError::missing_field("introspection.endpoint");
        assert!(err.to_string().ends_with("introspection.endpoint"));
    }
}
