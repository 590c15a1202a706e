use std::sync::Arc;
use tracing::{debug, info};

use super::branches::{check_note_id, plan_deletion};
use super::{
    blob_row, content_at_rest, next_position, title_at_rest, NewNote, NoteService, NoteUpdate,
};
use crate::entities::{
    Branch, EntityName, EntityRow, Note, NoteRow, NoteType, OptionRow, Revision, RevisionRow,
};
use crate::error::{StructuralViolation, TrellisError, TrellisResult};
use crate::protected::SessionToken;
use crate::store::RowStore;
use crate::utils::{branch_id_for, local_now, new_entity_id, utc_now, ROOT_NOTE_ID};

impl<S: RowStore> NoteService<S> {
    pub(super) fn find_note(&self, note_id: &str) -> TrellisResult<Arc<Note>> {
        self.snapshot()?
            .note(note_id)
            .ok_or_else(|| TrellisError::not_found(EntityName::Notes, note_id))
    }

    /// Create the graph root if the store has none
    pub fn ensure_root(&self) -> TrellisResult<Arc<Note>> {
        self.mutate(|snapshot, writes| {
            if snapshot.has_note(ROOT_NOTE_ID) {
                return Ok(());
            }
            let blob = blob_row(Vec::new());
            let (local, utc) = (local_now(), utc_now());
            writes.put(EntityRow::Note(NoteRow {
                note_id: ROOT_NOTE_ID.to_string(),
                title: ROOT_NOTE_ID.to_string(),
                note_type: NoteType::Text,
                mime: NoteType::Text.default_mime().to_string(),
                is_protected: false,
                is_deleted: false,
                blob_id: blob.blob_id.clone(),
                date_created: local.clone(),
                date_modified: local,
                utc_date_created: utc.clone(),
                utc_date_modified: utc,
            }));
            writes.put(EntityRow::Blob(blob));
            info!("Created root note");
            Ok(())
        })?;
        self.find_note(ROOT_NOTE_ID)
    }

    /// Create a note with its first branch
    ///
    /// Protected notes, and every note created under a protected parent, need a live
    /// session token.
    pub fn create_note(
        &self,
        new: NewNote,
        token: Option<&SessionToken>,
    ) -> TrellisResult<(Arc<Note>, Arc<Branch>)> {
        let (note_id, branch_id) = self.mutate(|snapshot, writes| {
            let parent = snapshot
                .note(&new.parent_note_id)
                .ok_or_else(|| StructuralViolation::MissingParent(new.parent_note_id.clone()))?;
            let note_id = new.note_id.clone().unwrap_or_else(new_entity_id);
            check_note_id(&note_id)?;
            if note_id == ROOT_NOTE_ID || snapshot.has_note(&note_id) {
                return Err(StructuralViolation::DuplicateId {
                    entity: EntityName::Notes,
                    id: note_id,
                }
                .into());
            }

            let is_protected = new.is_protected || parent.is_protected();
            let title = title_at_rest(&new.title, is_protected, token)?;
            let blob = blob_row(content_at_rest(&new.content, is_protected, token)?);
            let (local, utc) = (local_now(), utc_now());

            let note = NoteRow {
                note_id: note_id.clone(),
                title,
                note_type: new.note_type,
                mime: new
                    .mime
                    .clone()
                    .unwrap_or_else(|| new.note_type.default_mime().to_string()),
                is_protected,
                is_deleted: false,
                blob_id: blob.blob_id.clone(),
                date_created: local.clone(),
                date_modified: local,
                utc_date_created: utc.clone(),
                utc_date_modified: utc.clone(),
            };
            let position = new.position.unwrap_or_else(|| {
                next_position(
                    snapshot
                        .child_branches(&parent.note_id)
                        .iter()
                        .map(|b| b.note_position),
                )
            });
            let branch = Branch {
                branch_id: branch_id_for(&parent.note_id, &note_id),
                note_id: note_id.clone(),
                parent_note_id: parent.note_id.clone(),
                prefix: new.prefix.clone(),
                note_position: position,
                is_expanded: false,
                is_deleted: false,
                utc_date_modified: utc,
            };

            debug!(note_id = %note_id, parent_note_id = %parent.note_id, position, is_protected, "Creating note");
            let branch_id = branch.branch_id.clone();
            writes.put(EntityRow::Blob(blob));
            writes.put(EntityRow::Note(note));
            writes.put(EntityRow::Branch(branch));
            Ok((note_id, branch_id))
        })?;

        let snapshot = self.snapshot()?;
        let note = snapshot
            .note(&note_id)
            .ok_or_else(|| TrellisError::not_found(EntityName::Notes, &note_id))?;
        let branch = snapshot
            .branch(&branch_id)
            .ok_or_else(|| TrellisError::not_found(EntityName::Branches, &branch_id))?;
        Ok((note, branch))
    }

    /// Change title, type or mime. A protected title needs a live session token.
    pub fn update_note(
        &self,
        note_id: &str,
        update: NoteUpdate,
        token: Option<&SessionToken>,
    ) -> TrellisResult<Arc<Note>> {
        self.mutate(|snapshot, writes| {
            let note = snapshot
                .note(note_id)
                .ok_or_else(|| TrellisError::not_found(EntityName::Notes, note_id))?;
            let mut row = note.to_row();
            if let Some(title) = &update.title {
                row.title = title_at_rest(title, row.is_protected, token)?;
            }
            if let Some(note_type) = update.note_type {
                row.note_type = note_type;
            }
            if let Some(mime) = &update.mime {
                row.mime = mime.clone();
            }
            row.date_modified = local_now();
            row.utc_date_modified = utc_now();
            writes.put(EntityRow::Note(row));
            Ok(())
        })?;
        self.find_note(note_id)
    }

    /// Replace the note's content. Identical unprotected content shares one blob.
    pub fn set_note_content(
        &self,
        note_id: &str,
        content: &[u8],
        token: Option<&SessionToken>,
    ) -> TrellisResult<()> {
        self.mutate(|snapshot, writes| {
            let note = snapshot
                .note(note_id)
                .ok_or_else(|| TrellisError::not_found(EntityName::Notes, note_id))?;
            let blob = blob_row(content_at_rest(content, note.is_protected(), token)?);
            let mut row = note.to_row();
            if row.blob_id == blob.blob_id {
                return Ok(());
            }
            row.blob_id = blob.blob_id.clone();
            row.date_modified = local_now();
            row.utc_date_modified = utc_now();
            writes.put(EntityRow::Blob(blob));
            writes.put(EntityRow::Note(row));
            Ok(())
        })
    }

    /// Content of a note. Protected content needs a live session token.
    pub fn note_content(
        &self,
        note_id: &str,
        token: Option<&SessionToken>,
    ) -> TrellisResult<Vec<u8>> {
        let note = self.find_note(note_id)?;
        self.read_content(&note.blob_id, note.is_protected(), token)
    }

    /// Soft-delete a note with all its branches, and its subtree where it is not
    /// placed elsewhere
    pub fn delete_note(&self, note_id: &str) -> TrellisResult<()> {
        self.mutate(|snapshot, writes| {
            if note_id == ROOT_NOTE_ID {
                return Err(
                    StructuralViolation::RootViolation("the root note cannot be deleted".into())
                        .into(),
                );
            }
            if !snapshot.has_note(note_id) {
                return Err(TrellisError::not_found(EntityName::Notes, note_id));
            }
            plan_deletion(snapshot, snapshot.parent_branches(note_id), writes);
            Ok(())
        })
    }

    /// Snapshot the note's current title and content as a revision
    pub fn create_revision(&self, note_id: &str) -> TrellisResult<Arc<Revision>> {
        let revision_id = self.mutate(|snapshot, writes| {
            let note = snapshot
                .note(note_id)
                .ok_or_else(|| TrellisError::not_found(EntityName::Notes, note_id))?;
            let (local, utc) = (local_now(), utc_now());
            let revision = RevisionRow {
                revision_id: new_entity_id(),
                note_id: note.note_id.clone(),
                note_type: note.note_type,
                mime: note.mime.clone(),
                is_protected: note.is_protected(),
                title: note.title.at_rest(),
                blob_id: note.blob_id.clone(),
                date_last_edited: note.date_modified.clone(),
                date_created: local,
                utc_date_last_edited: note.utc_date_modified.clone(),
                utc_date_created: utc.clone(),
                utc_date_modified: utc,
            };
            let revision_id = revision.revision_id.clone();
            writes.put(EntityRow::Revision(revision));
            Ok(revision_id)
        })?;
        self.snapshot()?
            .revision(&revision_id)
            .ok_or_else(|| TrellisError::not_found(EntityName::Revisions, &revision_id))
    }

    pub fn revision_content(
        &self,
        revision_id: &str,
        token: Option<&SessionToken>,
    ) -> TrellisResult<Vec<u8>> {
        let revision = self
            .snapshot()?
            .revision(revision_id)
            .ok_or_else(|| TrellisError::not_found(EntityName::Revisions, revision_id))?;
        self.read_content(&revision.blob_id, revision.is_protected(), token)
    }

    /// Revisions are immutable and have no tombstone: deleting one erases it. Its
    /// attachments are soft-deleted.
    pub fn delete_revision(&self, revision_id: &str) -> TrellisResult<()> {
        self.mutate(|snapshot, writes| {
            if snapshot.revision(revision_id).is_none() {
                return Err(TrellisError::not_found(EntityName::Revisions, revision_id));
            }
            for attachment in snapshot.attachments_of(revision_id) {
                let mut row = attachment.to_row();
                row.is_deleted = true;
                row.utc_date_modified = utc_now();
                writes.put(EntityRow::Attachment(row));
            }
            writes.erase(EntityName::Revisions, revision_id);
            Ok(())
        })
    }

    /// Set a process-wide option. Unsynced options never reach replicas.
    pub fn set_option(&self, name: &str, value: &str, is_synced: bool) -> TrellisResult<()> {
        if name.trim().is_empty() {
            return Err(StructuralViolation::invalid("option name", "must not be empty").into());
        }
        self.mutate(|snapshot, writes| {
            if snapshot
                .option(name)
                .is_some_and(|o| o.value == value && o.is_synced == is_synced)
            {
                return Ok(());
            }
            writes.put(EntityRow::Option(OptionRow {
                name: name.to_string(),
                value: value.to_string(),
                is_synced,
                utc_date_modified: utc_now(),
            }));
            Ok(())
        })
    }
}
