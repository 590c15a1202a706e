//! At-rest rows
//!
//! Field names serialise in camelCase, the shape replicas exchange. Protected titles and
//! contents are ciphertext here.

use serde::{Deserialize, Serialize};

use super::kinds::{AttributeType, EntityName, NoteType};
use crate::hashing::{content_digest, entity_hash};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRow {
    pub note_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub note_type: NoteType,
    pub mime: String,
    pub is_protected: bool,
    pub is_deleted: bool,
    pub blob_id: String,
    pub date_created: String,
    pub date_modified: String,
    pub utc_date_created: String,
    pub utc_date_modified: String,
}

/// Placement of a note under a parent. A note with several branches is a clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub branch_id: String,
    pub note_id: String,
    pub parent_note_id: String,
    pub prefix: Option<String>,
    /// Ordering key among siblings; need not be contiguous
    pub note_position: i64,
    pub is_expanded: bool,
    pub is_deleted: bool,
    pub utc_date_modified: String,
}

/// Label or relation owned by a note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub attribute_id: String,
    pub note_id: String,
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
    pub name: String,
    pub value: String,
    pub position: i64,
    pub is_inheritable: bool,
    pub is_deleted: bool,
    pub utc_date_modified: String,
}

impl Attribute {
    pub fn is_label(&self) -> bool {
        self.attribute_type == AttributeType::Label
    }

    pub fn is_relation(&self) -> bool {
        self.attribute_type == AttributeType::Relation
    }

    /// Target note of a relation
    pub fn target_note_id(&self) -> Option<&str> {
        self.is_relation().then_some(self.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionRow {
    pub revision_id: String,
    pub note_id: String,
    #[serde(rename = "type")]
    pub note_type: NoteType,
    pub mime: String,
    pub is_protected: bool,
    pub title: String,
    pub blob_id: String,
    pub date_last_edited: String,
    pub date_created: String,
    pub utc_date_last_edited: String,
    pub utc_date_created: String,
    pub utc_date_modified: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRow {
    pub attachment_id: String,
    /// Owning note or revision
    pub owner_id: String,
    pub role: String,
    pub mime: String,
    pub title: String,
    pub position: i64,
    pub blob_id: String,
    pub is_protected: bool,
    pub is_deleted: bool,
    pub date_modified: String,
    pub utc_date_modified: String,
    pub utc_date_scheduled_for_erasure_since: Option<String>,
}

/// Content-addressed payload shared by notes, revisions and attachments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobRow {
    pub blob_id: String,
    pub content: Vec<u8>,
    pub content_length: i64,
    pub date_modified: String,
    pub utc_date_modified: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionRow {
    pub name: String,
    pub value: String,
    pub is_synced: bool,
    pub utc_date_modified: String,
}

/// One row of any kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entityName", content = "entity", rename_all = "lowercase")]
pub enum EntityRow {
    #[serde(rename = "notes")]
    Note(NoteRow),
    #[serde(rename = "branches")]
    Branch(Branch),
    #[serde(rename = "attributes")]
    Attribute(Attribute),
    #[serde(rename = "revisions")]
    Revision(RevisionRow),
    #[serde(rename = "attachments")]
    Attachment(AttachmentRow),
    #[serde(rename = "blobs")]
    Blob(BlobRow),
    #[serde(rename = "options")]
    Option(OptionRow),
}

impl EntityRow {
    pub fn entity_name(&self) -> EntityName {
        match self {
            EntityRow::Note(_) => EntityName::Notes,
            EntityRow::Branch(_) => EntityName::Branches,
            EntityRow::Attribute(_) => EntityName::Attributes,
            EntityRow::Revision(_) => EntityName::Revisions,
            EntityRow::Attachment(_) => EntityName::Attachments,
            EntityRow::Blob(_) => EntityName::Blobs,
            EntityRow::Option(_) => EntityName::Options,
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            EntityRow::Note(r) => &r.note_id,
            EntityRow::Branch(r) => &r.branch_id,
            EntityRow::Attribute(r) => &r.attribute_id,
            EntityRow::Revision(r) => &r.revision_id,
            EntityRow::Attachment(r) => &r.attachment_id,
            EntityRow::Blob(r) => &r.blob_id,
            EntityRow::Option(r) => &r.name,
        }
    }

    pub fn is_deleted(&self) -> bool {
        match self {
            EntityRow::Note(r) => r.is_deleted,
            EntityRow::Branch(r) => r.is_deleted,
            EntityRow::Attribute(r) => r.is_deleted,
            EntityRow::Attachment(r) => r.is_deleted,
            EntityRow::Revision(_) | EntityRow::Blob(_) | EntityRow::Option(_) => false,
        }
    }

    pub fn utc_date_modified(&self) -> &str {
        match self {
            EntityRow::Note(r) => &r.utc_date_modified,
            EntityRow::Branch(r) => &r.utc_date_modified,
            EntityRow::Attribute(r) => &r.utc_date_modified,
            EntityRow::Revision(r) => &r.utc_date_modified,
            EntityRow::Attachment(r) => &r.utc_date_modified,
            EntityRow::Blob(r) => &r.utc_date_modified,
            EntityRow::Option(r) => &r.utc_date_modified,
        }
    }

    /// Parent note of a branch
    pub fn parent_note_id(&self) -> Option<&str> {
        match self {
            EntityRow::Branch(r) => Some(&r.parent_note_id),
            _ => None,
        }
    }

    /// Owner of an attribute, revision or attachment
    pub fn owner_id(&self) -> Option<&str> {
        match self {
            EntityRow::Attribute(r) => Some(&r.note_id),
            EntityRow::Revision(r) => Some(&r.note_id),
            EntityRow::Attachment(r) => Some(&r.owner_id),
            _ => None,
        }
    }

    /// Blob referenced by this row
    pub fn blob_id(&self) -> Option<&str> {
        match self {
            EntityRow::Note(r) => Some(&r.blob_id),
            EntityRow::Revision(r) => Some(&r.blob_id),
            EntityRow::Attachment(r) => Some(&r.blob_id),
            _ => None,
        }
    }

    /// Whether replicas should receive changes to this row
    pub fn is_synced(&self) -> bool {
        match self {
            EntityRow::Option(r) => r.is_synced,
            _ => true,
        }
    }

    /// Canonical hash of the row's content. Modification dates are left out so that
    /// replicas converging on the same state agree.
    pub fn content_hash(&self) -> String {
        match self {
            EntityRow::Note(r) => entity_hash(
                &[
                    &r.note_id,
                    &r.title,
                    r.note_type.as_str(),
                    &r.mime,
                    bool_field(r.is_protected),
                    &r.blob_id,
                ],
                r.is_deleted,
            ),
            EntityRow::Branch(r) => entity_hash(
                &[
                    &r.branch_id,
                    &r.note_id,
                    &r.parent_note_id,
                    r.prefix.as_deref().unwrap_or(""),
                    &r.note_position.to_string(),
                ],
                r.is_deleted,
            ),
            EntityRow::Attribute(r) => entity_hash(
                &[
                    &r.attribute_id,
                    &r.note_id,
                    r.attribute_type.as_str(),
                    &r.name,
                    &r.value,
                    &r.position.to_string(),
                    bool_field(r.is_inheritable),
                ],
                r.is_deleted,
            ),
            EntityRow::Revision(r) => entity_hash(
                &[
                    &r.revision_id,
                    &r.note_id,
                    &r.title,
                    bool_field(r.is_protected),
                    &r.blob_id,
                    &r.date_last_edited,
                    &r.date_created,
                    &r.utc_date_last_edited,
                    &r.utc_date_created,
                ],
                false,
            ),
            EntityRow::Attachment(r) => entity_hash(
                &[
                    &r.attachment_id,
                    &r.owner_id,
                    &r.role,
                    &r.mime,
                    &r.title,
                    &r.position.to_string(),
                    &r.blob_id,
                    bool_field(r.is_protected),
                ],
                r.is_deleted,
            ),
            EntityRow::Blob(r) => entity_hash(&[&r.blob_id, &content_digest(&r.content)], false),
            EntityRow::Option(r) => entity_hash(&[&r.name, &r.value], false),
        }
    }
}

fn bool_field(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}
