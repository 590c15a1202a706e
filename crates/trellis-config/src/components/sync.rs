//! Replica identity

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// How this process tags the change entries it produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Identifier of this replica, written into every locally produced change entry
    pub instance_id: String,
}

impl SyncConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.instance_id.trim().is_empty() {
            return Err(ConfigError::invalid("sync.instance_id", "must not be empty"));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            instance_id: "local".to_string(),
        }
    }
}
