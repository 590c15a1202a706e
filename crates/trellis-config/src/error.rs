//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// File that was being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A field holds a value outside its allowed range
    #[error("Invalid value for {field}: {value}")]
    InvalidValue {
        /// Dotted field path, e.g. `protected_session.timeout_secs`
        field: String,
        /// Why the value was rejected
        value: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            value: value.into(),
        }
    }
}
