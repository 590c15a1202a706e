//! Component configurations

mod cache;
mod logging;
mod session;
mod storage;
mod sync;

pub use cache::CacheConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use session::{KdfConfig, ProtectedSessionConfig};
pub use storage::StorageConfig;
pub use sync::SyncConfig;
