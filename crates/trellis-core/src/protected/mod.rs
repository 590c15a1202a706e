//! Protected sessions
//!
//! Protected notes, revisions and attachments are encrypted at rest with a random data
//! key. The data key is itself wrapped with a key derived from the user's secret and is
//! only held in memory while a protected session is open.
//!
//! ## Layers
//!
//! - [`crypto`]: key derivation and authenticated encryption primitives
//! - [`EncryptionGate`]: owns the live session and its idle timeout
//! - [`SessionToken`]: weak handle callers present to read protected content
//! - [`Protected`]: per-field wrapper separating at-rest ciphertext from session plaintext

pub mod crypto;
mod gate;
mod session;
mod value;

pub use gate::{EncryptionGate, KeyMaterial};
pub use session::SessionToken;
pub use value::{Protected, LOCKED_PLACEHOLDER};

pub(crate) use session::ActiveSession;
