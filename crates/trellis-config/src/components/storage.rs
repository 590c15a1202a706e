//! Storage component configuration
//!
//! Database location and SQLite connection settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ConfigError;

/// Path value that selects an in-memory database
pub const MEMORY_PATH: &str = ":memory:";

/// Storage component configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file, or `:memory:`
    pub path: PathBuf,
    /// Enable write-ahead logging
    pub wal_mode: bool,
    /// Enforce foreign keys
    pub foreign_keys: bool,
    /// How long a locked database is retried before failing
    pub busy_timeout_ms: u64,
    /// SQLite page cache size (negative values are KiB, as in `PRAGMA cache_size`)
    pub cache_size: i64,
    /// Memory-mapped I/O size in bytes, 0 disables
    pub mmap_size: u64,
}

impl StorageConfig {
    /// Configuration for an in-memory database
    pub fn memory() -> Self {
        Self {
            path: PathBuf::from(MEMORY_PATH),
            wal_mode: false,
            ..Self::default()
        }
    }

    /// Whether this configuration points at an in-memory database
    pub fn is_memory(&self) -> bool {
        self.path.to_str() == Some(MEMORY_PATH)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::invalid("storage.path", "must not be empty"));
        }
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let path = dirs::data_dir()
            .map(|dir| dir.join("trellis").join("document.db"))
            .unwrap_or_else(|| PathBuf::from("./document.db"));
        Self {
            path,
            wal_mode: true,
            foreign_keys: false,
            busy_timeout_ms: 5_000,
            cache_size: -16_000,
            mmap_size: 0,
        }
    }
}
