//! Protected session configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ConfigError;

/// Protected session lifetime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectedSessionConfig {
    /// Idle time after which decrypted content is scrubbed
    pub timeout_secs: u64,
    /// How often the background reaper checks for an expired session
    pub reaper_interval_secs: u64,
    /// Cost parameters of the secret-to-key derivation
    pub kdf: KdfConfig,
}

impl ProtectedSessionConfig {
    /// Idle timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Reaper tick as a [`Duration`]
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "protected_session.timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.reaper_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "protected_session.reaper_interval_secs",
                "must be greater than 0",
            ));
        }
        self.kdf.validate()
    }
}

impl Default for ProtectedSessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            reaper_interval_secs: 5,
            kdf: KdfConfig::default(),
        }
    }
}

/// scrypt parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// log2 of the CPU/memory cost `N`
    pub log_n: u8,
    /// Block size `r`
    pub r: u32,
    /// Parallelism `p`
    pub p: u32,
}

impl KdfConfig {
    /// Parameters that make tests fast. Never use for real data.
    pub fn insecure_fast() -> Self {
        Self { log_n: 4, r: 8, p: 1 }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.log_n == 0 || self.log_n >= 64 {
            return Err(ConfigError::invalid(
                "protected_session.kdf.log_n",
                format!("{} is outside 1..64", self.log_n),
            ));
        }
        if self.r == 0 || self.p == 0 {
            return Err(ConfigError::invalid(
                "protected_session.kdf",
                "r and p must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for KdfConfig {
    fn default() -> Self {
        // N = 16384
        Self { log_n: 14, r: 8, p: 1 }
    }
}
