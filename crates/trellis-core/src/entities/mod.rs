//! Entity model
//!
//! Rows are the at-rest shape shared with the store and with replicas. Notes, revisions
//! and attachments additionally have a cached shape whose title is a [`Protected`]
//! value; branches and attributes are cached as their rows.
//!
//! [`Protected`]: crate::protected::Protected

mod attachment;
mod change;
mod kinds;
mod note;
mod revision;
mod rows;

pub use attachment::Attachment;
pub use change::{EntityChange, NewChange};
pub use kinds::{AttributeType, EntityName, NoteType, ParseKindError};
pub use note::Note;
pub use revision::Revision;
pub use rows::{
    AttachmentRow, Attribute, BlobRow, Branch, EntityRow, NoteRow, OptionRow, RevisionRow,
};
