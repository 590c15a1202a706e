//! Applying changes from another replica
//!
//! The transport is someone else's problem: it hands over ordered [`RemoteChange`]s,
//! each a change entry with the row it produced. A change whose hash already matches
//! the local row is a no-op. A change to an entity with a pending local change and a
//! different hash is reported as a [`Conflict`] for the caller to resolve; everything
//! else is validated like a local write and applied.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

use super::branches::{check_note_id, validate_placement};
use super::NoteService;
use crate::becca::BeccaSnapshot;
use crate::entities::{EntityChange, EntityName, EntityRow};
use crate::error::{StructuralViolation, TrellisError, TrellisResult};
use crate::store::RowStore;
use crate::utils::ROOT_NOTE_ID;

/// A change entry with the row it produced; `None` for erasures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteChange {
    pub change: EntityChange,
    pub row: Option<EntityRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Local state already matched; nothing was written
    AlreadyApplied,
    /// Written, with the change entry recorded locally
    Applied(EntityChange),
    Conflict(Box<Conflict>),
}

/// Both versions of an entity changed on two replicas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub remote: RemoteChange,
    pub local_row: Option<EntityRow>,
    /// The pending local change
    pub local_change: EntityChange,
}

impl Conflict {
    pub fn entity_name(&self) -> EntityName {
        self.remote.change.entity_name
    }

    pub fn entity_id(&self) -> &str {
        &self.remote.change.entity_id
    }

    /// Last-write-wins verdict: the later change date wins, ties go to the larger hash
    pub fn remote_wins(&self) -> bool {
        let remote = &self.remote.change;
        let local = &self.local_change;
        match remote.utc_date_changed.cmp(&local.utc_date_changed) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => remote.hash > local.hash,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Keep the local version; its pending change still goes out
    KeepLocal,
    TakeRemote,
    LastWriteWins,
}

fn check_payload(remote: &RemoteChange) -> Result<(), StructuralViolation> {
    let change = &remote.change;
    match &remote.row {
        None if change.is_erased => Ok(()),
        None => Err(StructuralViolation::invalid("row", "missing for a non-erasure change")),
        Some(_) if change.is_erased => {
            Err(StructuralViolation::invalid("row", "present for an erasure"))
        }
        Some(row) => {
            if row.entity_name() != change.entity_name || row.entity_id() != change.entity_id {
                return Err(StructuralViolation::invalid(
                    "row",
                    format!(
                        "{} {} does not belong to the change for {} {}",
                        row.entity_name(),
                        row.entity_id(),
                        change.entity_name,
                        change.entity_id
                    ),
                ));
            }
            if row.content_hash() != change.hash {
                return Err(StructuralViolation::invalid(
                    "hash",
                    "row does not match its change entry",
                ));
            }
            Ok(())
        }
    }
}

/// A note is only tombstoned once no live branch or attribute hangs off it, so a sync
/// cut short never leaves a store that fails to load
fn check_note_tombstone(snapshot: &BeccaSnapshot, note_id: &str) -> Result<(), StructuralViolation> {
    if note_id == ROOT_NOTE_ID {
        return Err(StructuralViolation::RootViolation(
            "the root note cannot be deleted".into(),
        ));
    }
    let branches = snapshot.parent_branches(note_id).len() + snapshot.child_branches(note_id).len();
    let attributes = snapshot.own_attributes(note_id).len();
    if branches + attributes > 0 {
        return Err(StructuralViolation::invalid(
            "note deletion",
            format!("{note_id} still has {branches} live branches and {attributes} live attributes"),
        ));
    }
    Ok(())
}

/// Full validation of a remote row against the local graph
fn validate_remote_row(snapshot: &BeccaSnapshot, row: &EntityRow) -> Result<(), StructuralViolation> {
    if let EntityRow::Note(note) = row {
        if note.is_deleted {
            return check_note_tombstone(snapshot, &note.note_id);
        }
    }
    if row.is_deleted() {
        return Ok(());
    }
    match row {
        EntityRow::Branch(branch) => {
            let same_placement = snapshot.branch(&branch.branch_id).is_some_and(|b| {
                b.note_id == branch.note_id && b.parent_note_id == branch.parent_note_id
            });
            if same_placement {
                Ok(())
            } else {
                validate_placement(snapshot, &branch.note_id, &branch.parent_note_id)
            }
        }
        EntityRow::Attribute(attribute) if !snapshot.has_note(&attribute.note_id) => {
            Err(StructuralViolation::MissingNote(attribute.note_id.clone()))
        }
        EntityRow::Note(note) if note.note_id == ROOT_NOTE_ID && note.is_protected => Err(
            StructuralViolation::RootViolation("the root note cannot be protected".into()),
        ),
        EntityRow::Note(note) if note.note_id != ROOT_NOTE_ID => check_note_id(&note.note_id),
        _ => Ok(()),
    }
}

fn already_applied(remote: &RemoteChange, local_row: Option<&EntityRow>) -> bool {
    match local_row {
        None => remote.change.is_erased,
        Some(row) => !remote.change.is_erased && row.content_hash() == remote.change.hash,
    }
}

impl<S: RowStore> NoteService<S> {
    /// Apply one change from another replica. Idempotent.
    pub fn apply_remote(&self, remote: RemoteChange) -> TrellisResult<ApplyOutcome> {
        let _guard = self.write_lock.lock();
        let snapshot = self.becca.snapshot()?;
        check_payload(&remote)?;

        let change = &remote.change;
        let local_row = self.store.get(change.entity_name, &change.entity_id)?;
        if already_applied(&remote, local_row.as_ref()) {
            debug!(entity = %change.entity_name, entity_id = %change.entity_id, "Remote change already applied");
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        if local_row.is_some() {
            if let Some(local_change) = self
                .store
                .latest_change(change.entity_name, &change.entity_id)?
            {
                if !local_change.is_synced && local_change.hash != change.hash {
                    info!(entity = %change.entity_name, entity_id = %change.entity_id, "Sync conflict");
                    return Ok(ApplyOutcome::Conflict(Box::new(Conflict {
                        remote,
                        local_row,
                        local_change,
                    })));
                }
            }
        }

        let applied = self.write_remote(&snapshot, &remote)?;
        Ok(ApplyOutcome::Applied(applied))
    }

    /// Settle a reported conflict. Returns the recorded change when the remote version
    /// was taken. Fails with [`TrellisError::Conflict`] when the local entity changed
    /// again since the conflict was reported.
    pub fn resolve_conflict(
        &self,
        conflict: Conflict,
        resolution: ConflictResolution,
    ) -> TrellisResult<Option<EntityChange>> {
        let _guard = self.write_lock.lock();
        let snapshot = self.becca.snapshot()?;
        let (entity, id) = (conflict.entity_name(), conflict.entity_id().to_string());

        let current = self.store.get(entity, &id)?;
        if current != conflict.local_row {
            let local_change = self
                .store
                .latest_change(entity, &id)?
                .unwrap_or_else(|| conflict.local_change.clone());
            return Err(TrellisError::Conflict(Box::new(Conflict {
                remote: conflict.remote,
                local_row: current,
                local_change,
            })));
        }

        let take_remote = match resolution {
            ConflictResolution::KeepLocal => false,
            ConflictResolution::TakeRemote => true,
            ConflictResolution::LastWriteWins => conflict.remote_wins(),
        };
        info!(entity = %entity, entity_id = %id, ?resolution, take_remote, "Resolved sync conflict");
        if !take_remote {
            return Ok(None);
        }
        check_payload(&conflict.remote)?;
        self.write_remote(&snapshot, &conflict.remote).map(Some)
    }

    /// Local changes after `cursor` still to be sent, each with the row it produced.
    /// Entries superseded by a later change of the same entity are skipped.
    pub fn outgoing_changes(&self, cursor: i64, limit: usize) -> TrellisResult<Vec<RemoteChange>> {
        let mut outgoing = Vec::new();
        for change in self.store.changes_since(cursor, limit)? {
            if change.is_synced {
                continue;
            }
            let row = self.store.get(change.entity_name, &change.entity_id)?;
            let remote = RemoteChange { change, row };
            let current = match (&remote.row, remote.change.is_erased) {
                (None, erased) => erased,
                (Some(row), false) => row.content_hash() == remote.change.hash,
                (Some(_), true) => false,
            };
            if current {
                outgoing.push(remote);
            }
        }
        Ok(outgoing)
    }

    /// Validate and write a remote row with its change entry, then patch the cache.
    /// Callers hold the mutation lock.
    fn write_remote(
        &self,
        snapshot: &Arc<BeccaSnapshot>,
        remote: &RemoteChange,
    ) -> TrellisResult<EntityChange> {
        if let Some(row) = &remote.row {
            validate_remote_row(snapshot, row)?;
        }
        let entity = remote.change.entity_name;
        let id = remote.change.entity_id.as_str();

        let change = self.store.transaction(|tx| {
            match &remote.row {
                Some(row) => tx.put(row)?,
                None => {
                    tx.erase(entity, id)?;
                }
            }
            Ok::<_, TrellisError>(self.tracker.record_remote(tx, &remote.change)?)
        })?;

        let token = self.gate.token();
        self.becca
            .reload(self.store.as_ref(), entity, id, token.as_ref())?;
        debug!(entity = %entity, entity_id = %id, change_id = %change.change_id, "Applied remote change");
        self.tracker.publish(std::slice::from_ref(&change));
        Ok(change)
    }
}
