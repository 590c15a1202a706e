//! Row fixtures for unit tests

use std::sync::Arc;
use trellis_config::TrellisConfig;

use crate::entities::{Attribute, AttributeType, Branch, EntityRow, NoteRow, NoteType};
use crate::service::NoteService;
use crate::store::MemoryRowStore;
use crate::utils::branch_id_for;

pub(crate) const T0: &str = "2024-01-01 00:00:00.000Z";

pub(crate) fn note_row(note_id: &str, title: &str) -> NoteRow {
    NoteRow {
        note_id: note_id.into(),
        title: title.into(),
        note_type: NoteType::Text,
        mime: "text/html".into(),
        is_protected: false,
        is_deleted: false,
        blob_id: String::new(),
        date_created: "2024-01-01 00:00:00.000+0000".into(),
        date_modified: "2024-01-01 00:00:00.000+0000".into(),
        utc_date_created: T0.into(),
        utc_date_modified: T0.into(),
    }
}

pub(crate) fn note(note_id: &str, title: &str) -> EntityRow {
    EntityRow::Note(note_row(note_id, title))
}

pub(crate) fn branch_row(note_id: &str, parent_note_id: &str, position: i64) -> Branch {
    Branch {
        branch_id: branch_id_for(parent_note_id, note_id),
        note_id: note_id.into(),
        parent_note_id: parent_note_id.into(),
        prefix: None,
        note_position: position,
        is_expanded: false,
        is_deleted: false,
        utc_date_modified: T0.into(),
    }
}

pub(crate) fn branch(note_id: &str, parent_note_id: &str, position: i64) -> EntityRow {
    EntityRow::Branch(branch_row(note_id, parent_note_id, position))
}

fn attribute(
    id: &str,
    owner: &str,
    attribute_type: AttributeType,
    name: &str,
    value: &str,
    inheritable: bool,
) -> EntityRow {
    EntityRow::Attribute(Attribute {
        attribute_id: id.into(),
        note_id: owner.into(),
        attribute_type,
        name: name.into(),
        value: value.into(),
        position: 0,
        is_inheritable: inheritable,
        is_deleted: false,
        utc_date_modified: T0.into(),
    })
}

pub(crate) fn label(id: &str, owner: &str, name: &str, value: &str, inheritable: bool) -> EntityRow {
    attribute(id, owner, AttributeType::Label, name, value, inheritable)
}

pub(crate) fn relation(id: &str, owner: &str, name: &str, target: &str) -> EntityRow {
    attribute(id, owner, AttributeType::Relation, name, target, false)
}

/// Loaded service over an in-memory store, with the root note in place
pub(crate) fn service() -> NoteService<MemoryRowStore> {
    let store = Arc::new(MemoryRowStore::new());
    let service =
        NoteService::open(store, &TrellisConfig::for_testing()).expect("empty store loads");
    service.ensure_root().expect("root is created");
    service
}
