//! Configuration loading
//!
//! Resolution order, later wins:
//! 1. Built-in defaults
//! 2. TOML file (missing sections and fields fall back to defaults)
//! 3. `TRELLIS_*` environment variables

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{ConfigError, TrellisConfig};

/// Overrides `storage.path`
pub const ENV_DB_PATH: &str = "TRELLIS_DB_PATH";
/// Overrides `protected_session.timeout_secs`
pub const ENV_SESSION_TIMEOUT: &str = "TRELLIS_SESSION_TIMEOUT_SECS";
/// Overrides `logging.level`
pub const ENV_LOG_LEVEL: &str = "TRELLIS_LOG_LEVEL";
/// Overrides `sync.instance_id`
pub const ENV_INSTANCE_ID: &str = "TRELLIS_INSTANCE_ID";

/// Loads [`TrellisConfig`] from files and the environment
pub struct ConfigLoader;

impl ConfigLoader {
    /// Parse a TOML document without touching the environment
    pub fn from_toml_str(contents: &str) -> Result<TrellisConfig, ConfigError> {
        let config: TrellisConfig =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, apply environment overrides and validate
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<TrellisConfig, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: TrellisConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::apply_env_overrides(&mut config)?;
        config.validate()?;

        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load `path` if given, else the default location if it exists, else defaults
    pub fn load(path: Option<&Path>) -> Result<TrellisConfig, ConfigError> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }

        match Self::default_path() {
            Some(default) if default.exists() => Self::load_from_file(default),
            _ => {
                debug!("No config file found, using defaults");
                let mut config = TrellisConfig::default();
                Self::apply_env_overrides(&mut config)?;
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// `~/.config/trellis/config.toml` on Linux, the platform equivalent elsewhere
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("trellis").join("config.toml"))
    }

    /// Apply `TRELLIS_*` variables on top of `config`
    pub fn apply_env_overrides(config: &mut TrellisConfig) -> Result<(), ConfigError> {
        if let Ok(path) = std::env::var(ENV_DB_PATH) {
            debug!(%path, "Database path overridden from environment");
            config.storage.path = PathBuf::from(path);
        }

        if let Ok(timeout) = std::env::var(ENV_SESSION_TIMEOUT) {
            config.protected_session.timeout_secs = timeout.parse().map_err(|_| {
                ConfigError::invalid(ENV_SESSION_TIMEOUT, format!("'{}' is not a number", timeout))
            })?;
        }

        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            config.logging.level = level;
        }

        if let Ok(instance_id) = std::env::var(ENV_INSTANCE_ID) {
            config.sync.instance_id = instance_id;
        }

        Ok(())
    }
}
