//! Error types for the note graph
//!
//! Absence is not an error: lookups return `Option`. Only operations that need an
//! entity to exist raise [`TrellisError::NotFound`].

use thiserror::Error;

use crate::entities::EntityName;
use crate::service::Conflict;
use crate::store::StoreError;

/// A write that would break a graph invariant. Rejected before anything is written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralViolation {
    #[error("placing note {note_id} under {parent_note_id} would create a cycle")]
    Cycle {
        note_id: String,
        parent_note_id: String,
    },

    #[error("note {note_id} is already placed under {parent_note_id}")]
    DuplicatePlacement {
        note_id: String,
        parent_note_id: String,
    },

    #[error("note {0} does not exist")]
    MissingNote(String),

    #[error("parent note {0} does not exist")]
    MissingParent(String),

    #[error("root note: {0}")]
    RootViolation(String),

    #[error("{entity} {id} already exists")]
    DuplicateId { entity: EntityName, id: String },

    #[error("invalid {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl StructuralViolation {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Error type for every core operation
#[derive(Error, Debug)]
pub enum TrellisError {
    #[error("Structural violation: {0}")]
    Structural(#[from] StructuralViolation),

    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityName, id: String },

    /// Wrong secret. Deliberately carries no detail.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Ciphertext could not be authenticated with the session key
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Protected content was read without a live session
    #[error("Protected content is locked")]
    Locked,

    #[error("This operation requires an active protected session")]
    SessionRequired,

    #[error("Protected sessions have not been set up for this database")]
    ProtectionNotInitialized,

    /// The store holds rows the graph cannot be built from. Fatal at load time.
    #[error("Corrupted data detected: {0}")]
    Corruption(String),

    #[error("Note cache is not loaded yet")]
    NotReady,

    /// Local state moved on since a sync conflict was reported
    #[error("Conflicting change for {} {}", .0.entity_name(), .0.entity_id())]
    Conflict(Box<Conflict>),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Crypto error: {0}")]
    Crypto(String),
}

/// Result type for core operations
pub type TrellisResult<T> = Result<T, TrellisError>;

impl TrellisError {
    pub(crate) fn not_found(entity: EntityName, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Whether the error is a rejected write that left no trace
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Structural(_))
    }

    /// Whether the error concerns protected content access rather than data
    pub fn is_protection_error(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed
                | Self::DecryptionFailed
                | Self::Locked
                | Self::SessionRequired
                | Self::ProtectionNotInitialized
        )
    }
}
