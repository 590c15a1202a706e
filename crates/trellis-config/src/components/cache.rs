//! Graph cache configuration

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// How the in-memory note graph is loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Rows read per store round trip during an incremental load; the loader yields to
    /// the runtime between batches
    pub load_batch_size: usize,
    /// Capacity of the in-process change broadcast channel
    pub change_channel_capacity: usize,
}

impl CacheConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.load_batch_size == 0 {
            return Err(ConfigError::invalid("cache.load_batch_size", "must be at least 1"));
        }
        if self.change_channel_capacity == 0 {
            return Err(ConfigError::invalid(
                "cache.change_channel_capacity",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            load_batch_size: 1_000,
            change_channel_capacity: 1_024,
        }
    }
}
