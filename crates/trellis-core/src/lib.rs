//! Trellis core: the in-memory note graph and everything that keeps it honest.
//!
//! ## Components
//!
//! - **entities**: at-rest rows and cached forms of notes, branches, attributes,
//!   revisions, attachments, blobs and options
//! - **protected**: the encryption gate, session tokens and the [`Protected`] wrapper
//! - **becca**: the graph cache with its derived indices and structural queries
//! - **changes**: the ordered change feed used for invalidation and replica sync
//! - **service**: [`NoteService`], the only way to mutate notes
//! - **store**: the [`RowStore`] abstraction over the durable relational store
//!
//! ## Data flow
//!
//! ```text
//! RowStore --load--> Becca --snapshot--> readers
//! NoteService --transaction--> RowStore (rows + change entries)
//!             --publish------> Becca (one snapshot swap per mutation)
//!             --broadcast----> change subscribers
//! ```

pub mod becca;
pub mod changes;
pub mod entities;
pub mod error;
pub mod hashing;
pub mod protected;
pub mod service;
pub mod store;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use becca::{Becca, BeccaSnapshot, BeccaStats};
pub use changes::ChangeTracker;
pub use entities::{
    Attachment, AttachmentRow, Attribute, AttributeType, BlobRow, Branch, EntityChange,
    EntityName, EntityRow, NewChange, Note, NoteRow, NoteType, OptionRow, Revision, RevisionRow,
};
pub use error::{StructuralViolation, TrellisError, TrellisResult};
pub use protected::{EncryptionGate, Protected, SessionToken, LOCKED_PLACEHOLDER};
pub use service::{
    ApplyOutcome, AttributeUpdate, BranchUpdate, Conflict, ConflictResolution, NewAttachment,
    NewAttribute, NewBranch, NewNote, NoteService, NoteUpdate, PurgeReport, RemoteChange,
};
pub use store::{MemoryRowStore, RowStore, ScanFilter, StoreError, StoreResult, StoreTx};
pub use utils::ROOT_NOTE_ID;
