//! # Trellis Configuration Library
//!
//! Typed configuration for the Trellis workspace: where the note database lives, how the
//! graph cache loads, how long a protected session stays open, and how this replica
//! identifies itself in the change feed.
//!
//! ## Features
//!
//! - TOML files with per-field defaults (an empty file is a valid configuration)
//! - Environment overrides (`TRELLIS_*`) applied on top of the file
//! - Validation with field-level error messages
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use trellis_config::ConfigLoader;
//!
//! let config = ConfigLoader::load_from_file("trellis.toml")?;
//! println!("database at {}", config.storage.path.display());
//! # Ok::<(), trellis_config::ConfigError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod components;
mod error;
mod loader;

pub use components::{
    CacheConfig, KdfConfig, LogFormat, LoggingConfig, ProtectedSessionConfig, StorageConfig,
    SyncConfig,
};
pub use error::ConfigError;
pub use loader::{ConfigLoader, ENV_DB_PATH, ENV_INSTANCE_ID, ENV_LOG_LEVEL, ENV_SESSION_TIMEOUT};

use serde::{Deserialize, Serialize};

/// Root configuration for a Trellis installation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrellisConfig {
    /// Database location and SQLite tuning
    pub storage: StorageConfig,
    /// Graph cache loading behaviour
    pub cache: CacheConfig,
    /// Protected session timeout and key derivation cost
    pub protected_session: ProtectedSessionConfig,
    /// Replica identity for the change feed
    pub sync: SyncConfig,
    /// Log level and output format
    pub logging: LoggingConfig,
}

impl TrellisConfig {
    /// Check cross-field constraints that serde defaults cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.storage.validate()?;
        self.cache.validate()?;
        self.protected_session.validate()?;
        self.sync.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Configuration for tests: in-memory database, cheap key derivation
    pub fn for_testing() -> Self {
        Self {
            storage: StorageConfig::memory(),
            protected_session: ProtectedSessionConfig {
                kdf: KdfConfig::insecure_fast(),
                ..ProtectedSessionConfig::default()
            },
            ..Self::default()
        }
    }
}
