use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use super::{next_position, BranchUpdate, NewBranch, NoteService, WriteSet};
use crate::becca::BeccaSnapshot;
use crate::entities::{Branch, EntityName, EntityRow};
use crate::error::{StructuralViolation, TrellisError, TrellisResult};
use crate::store::RowStore;
use crate::utils::{branch_id_for, utc_now, BRANCH_ID_SEPARATOR, ROOT_NOTE_ID};

/// Reject note ids that could make two placements share a branch id
pub(super) fn check_note_id(note_id: &str) -> Result<(), StructuralViolation> {
    if note_id.is_empty() {
        return Err(StructuralViolation::invalid("note id", "must not be empty"));
    }
    if note_id.contains(BRANCH_ID_SEPARATOR) {
        return Err(StructuralViolation::invalid(
            "note id",
            format!("{note_id} contains '{BRANCH_ID_SEPARATOR}'"),
        ));
    }
    Ok(())
}

/// Check that `note_id` may be placed under `parent_note_id`
pub(super) fn validate_placement(
    snapshot: &BeccaSnapshot,
    note_id: &str,
    parent_note_id: &str,
) -> Result<(), StructuralViolation> {
    if !snapshot.has_note(note_id) {
        return Err(StructuralViolation::MissingNote(note_id.to_string()));
    }
    if !snapshot.has_note(parent_note_id) {
        return Err(StructuralViolation::MissingParent(parent_note_id.to_string()));
    }
    if note_id == ROOT_NOTE_ID {
        return Err(StructuralViolation::RootViolation(
            "the root note cannot be placed under another note".into(),
        ));
    }
    if snapshot.branch_for(note_id, parent_note_id).is_some() {
        return Err(StructuralViolation::DuplicatePlacement {
            note_id: note_id.to_string(),
            parent_note_id: parent_note_id.to_string(),
        });
    }
    let branch_id = branch_id_for(parent_note_id, note_id);
    if snapshot.branch(&branch_id).is_some() {
        return Err(StructuralViolation::DuplicateId {
            entity: EntityName::Branches,
            id: branch_id,
        });
    }
    if note_id == parent_note_id || snapshot.is_ancestor(note_id, parent_note_id) {
        return Err(StructuralViolation::Cycle {
            note_id: note_id.to_string(),
            parent_note_id: parent_note_id.to_string(),
        });
    }
    Ok(())
}

fn append_position(snapshot: &BeccaSnapshot, parent_note_id: &str) -> i64 {
    next_position(
        snapshot
            .child_branches(parent_note_id)
            .iter()
            .map(|b| b.note_position),
    )
}

/// Soft-delete `branches`. A note whose last live branch goes is deleted too, with its
/// attributes, attachments, incoming relations and child branches, and so on down the
/// subtree. Clones placed elsewhere survive.
///
/// Note tombstones are written last, deepest first, so any prefix of the resulting
/// change feed leaves no live branch or attribute pointing at a deleted note.
pub(super) fn plan_deletion(
    snapshot: &BeccaSnapshot,
    branches: Vec<Arc<Branch>>,
    writes: &mut WriteSet,
) {
    let now = utc_now();
    let mut stack = branches;
    let mut deleted_branches: HashSet<String> = HashSet::new();
    let mut deleted_notes: HashSet<String> = HashSet::new();
    let mut deleted_attributes: HashSet<String> = HashSet::new();
    let mut note_tombstones = Vec::new();

    while let Some(branch) = stack.pop() {
        if !deleted_branches.insert(branch.branch_id.clone()) {
            continue;
        }
        let mut row = Branch::clone(&branch);
        row.is_deleted = true;
        row.utc_date_modified = now.clone();
        writes.put(EntityRow::Branch(row));

        let note_id = &branch.note_id;
        let still_placed = snapshot
            .parent_branches(note_id)
            .iter()
            .any(|b| !deleted_branches.contains(&b.branch_id));
        if still_placed || !deleted_notes.insert(note_id.clone()) {
            continue;
        }
        let Some(note) = snapshot.note(note_id) else {
            continue;
        };

        debug!(note_id = %note_id, "Deleting note with its last branch");
        let mut note_row = note.to_row();
        note_row.is_deleted = true;
        if note_row.is_protected {
            note_row.title.clear();
        }
        note_row.utc_date_modified = now.clone();
        note_tombstones.push(EntityRow::Note(note_row));

        let attributes = snapshot
            .own_attributes(note_id)
            .into_iter()
            .chain(snapshot.incoming_relations(note_id));
        for attribute in attributes {
            if !deleted_attributes.insert(attribute.attribute_id.clone()) {
                continue;
            }
            let mut row = (*attribute).clone();
            row.is_deleted = true;
            row.utc_date_modified = now.clone();
            writes.put(EntityRow::Attribute(row));
        }

        for attachment in snapshot.attachments_of(note_id) {
            let mut row = attachment.to_row();
            row.is_deleted = true;
            if row.is_protected {
                row.title.clear();
            }
            row.utc_date_modified = now.clone();
            writes.put(EntityRow::Attachment(row));
        }

        stack.extend(snapshot.child_branches(note_id));
    }

    for row in note_tombstones.into_iter().rev() {
        writes.put(row);
    }
}

impl<S: RowStore> NoteService<S> {
    fn find_branch(&self, branch_id: &str) -> TrellisResult<Arc<Branch>> {
        self.snapshot()?
            .branch(branch_id)
            .ok_or_else(|| TrellisError::not_found(EntityName::Branches, branch_id))
    }

    /// Place an existing note under another parent (clone)
    pub fn create_branch(&self, new: NewBranch) -> TrellisResult<Arc<Branch>> {
        let branch_id = self.mutate(|snapshot, writes| {
            validate_placement(snapshot, &new.note_id, &new.parent_note_id)?;
            let branch = Branch {
                branch_id: branch_id_for(&new.parent_note_id, &new.note_id),
                note_id: new.note_id.clone(),
                parent_note_id: new.parent_note_id.clone(),
                prefix: new.prefix.clone(),
                note_position: new
                    .position
                    .unwrap_or_else(|| append_position(snapshot, &new.parent_note_id)),
                is_expanded: new.is_expanded,
                is_deleted: false,
                utc_date_modified: utc_now(),
            };
            debug!(branch_id = %branch.branch_id, position = branch.note_position, "Creating branch");
            let branch_id = branch.branch_id.clone();
            writes.put(EntityRow::Branch(branch));
            Ok(branch_id)
        })?;
        self.find_branch(&branch_id)
    }

    /// Move a placement to another parent, appended after the last sibling. The old
    /// branch is soft-deleted and a new one created.
    pub fn move_branch(&self, branch_id: &str, new_parent_note_id: &str) -> TrellisResult<Arc<Branch>> {
        let new_branch_id = self.mutate(|snapshot, writes| {
            let branch = snapshot
                .branch(branch_id)
                .ok_or_else(|| TrellisError::not_found(EntityName::Branches, branch_id))?;
            if branch.parent_note_id == new_parent_note_id {
                return Ok(branch.branch_id.clone());
            }
            validate_placement(snapshot, &branch.note_id, new_parent_note_id)?;

            let now = utc_now();
            let mut old = Branch::clone(&branch);
            old.is_deleted = true;
            old.utc_date_modified = now.clone();

            let moved = Branch {
                branch_id: branch_id_for(new_parent_note_id, &branch.note_id),
                note_id: branch.note_id.clone(),
                parent_note_id: new_parent_note_id.to_string(),
                prefix: branch.prefix.clone(),
                note_position: append_position(snapshot, new_parent_note_id),
                is_expanded: branch.is_expanded,
                is_deleted: false,
                utc_date_modified: now,
            };
            let moved_id = moved.branch_id.clone();
            writes.put(EntityRow::Branch(old));
            writes.put(EntityRow::Branch(moved));
            Ok(moved_id)
        })?;
        self.find_branch(&new_branch_id)
    }

    pub fn update_branch(&self, branch_id: &str, update: BranchUpdate) -> TrellisResult<Arc<Branch>> {
        self.mutate(|snapshot, writes| {
            let branch = snapshot
                .branch(branch_id)
                .ok_or_else(|| TrellisError::not_found(EntityName::Branches, branch_id))?;
            let mut row = Branch::clone(&branch);
            if let Some(position) = update.note_position {
                row.note_position = position;
            }
            if let Some(prefix) = &update.prefix {
                row.prefix = prefix.clone();
            }
            if let Some(expanded) = update.is_expanded {
                row.is_expanded = expanded;
            }
            if row == *branch {
                return Ok(());
            }
            row.utc_date_modified = utc_now();
            writes.put(EntityRow::Branch(row));
            Ok(())
        })?;
        self.find_branch(branch_id)
    }

    /// Soft-delete a placement. Returns whether the note itself was deleted because
    /// this was its last branch.
    pub fn delete_branch(&self, branch_id: &str) -> TrellisResult<bool> {
        self.mutate(|snapshot, writes| {
            let branch = snapshot
                .branch(branch_id)
                .ok_or_else(|| TrellisError::not_found(EntityName::Branches, branch_id))?;
            let note_id = branch.note_id.clone();
            plan_deletion(snapshot, vec![branch], writes);
            Ok(writes
                .rows
                .iter()
                .any(|row| matches!(row, EntityRow::Note(n) if n.note_id == note_id)))
        })
    }
}
