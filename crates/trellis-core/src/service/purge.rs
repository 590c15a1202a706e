//! Physical removal of soft-deleted rows and unreferenced blobs

use std::collections::{BTreeSet, HashSet};
use tracing::info;

use super::NoteService;
use crate::entities::{EntityName, EntityRow};
use crate::error::TrellisResult;
use crate::store::{RowStore, ScanFilter};
use crate::utils::utc_before;

/// Rows erased by one purge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub notes: usize,
    pub branches: usize,
    pub attributes: usize,
    pub revisions: usize,
    pub attachments: usize,
    pub blobs: usize,
}

impl PurgeReport {
    pub fn total(&self) -> usize {
        self.notes + self.branches + self.attributes + self.revisions + self.attachments + self.blobs
    }

    fn count(&mut self, entity: EntityName) {
        match entity {
            EntityName::Notes => self.notes += 1,
            EntityName::Branches => self.branches += 1,
            EntityName::Attributes => self.attributes += 1,
            EntityName::Revisions => self.revisions += 1,
            EntityName::Attachments => self.attachments += 1,
            EntityName::Blobs => self.blobs += 1,
            EntityName::Options => {}
        }
    }
}

impl<S: RowStore> NoteService<S> {
    /// Erase rows soft-deleted at least `older_than` ago, then unreferenced blobs.
    /// An erased note takes its revisions and attachments with it. Every erasure is
    /// recorded in the change feed.
    pub fn purge_deleted(&self, older_than: chrono::Duration) -> TrellisResult<PurgeReport> {
        let cutoff = utc_before(older_than);
        let mut report = self.mutate(|_, writes| {
            let mut doomed: BTreeSet<(EntityName, String)> = BTreeSet::new();
            let kinds = EntityName::ALL.into_iter().filter(EntityName::is_soft_deletable);
            for entity in kinds {
                for row in self.store.scan(entity, &ScanFilter::Deleted)? {
                    if row.utc_date_modified() > cutoff.as_str() {
                        continue;
                    }
                    if let EntityRow::Note(note) = &row {
                        self.owned_rows(&note.note_id, &mut doomed)?;
                    }
                    doomed.insert((entity, row.entity_id().to_string()));
                }
            }

            let mut report = PurgeReport::default();
            for (entity, id) in doomed {
                report.count(entity);
                writes.erase(entity, id);
            }
            Ok(report)
        })?;

        report.blobs = self.erase_unused_blobs()?;
        info!(
            notes = report.notes,
            branches = report.branches,
            attributes = report.attributes,
            revisions = report.revisions,
            attachments = report.attachments,
            blobs = report.blobs,
            "Purged deleted rows"
        );
        Ok(report)
    }

    /// Erase blobs no note, revision or attachment points at
    pub fn erase_unused_blobs(&self) -> TrellisResult<usize> {
        self.mutate(|_, writes| {
            let mut referenced = HashSet::new();
            for entity in [EntityName::Notes, EntityName::Revisions, EntityName::Attachments] {
                for row in self.store.scan(entity, &ScanFilter::All)? {
                    if let Some(blob_id) = row.blob_id() {
                        referenced.insert(blob_id.to_string());
                    }
                }
            }

            let mut erased = 0;
            for blob in self.store.scan(EntityName::Blobs, &ScanFilter::All)? {
                if !referenced.contains(blob.entity_id()) {
                    writes.erase(EntityName::Blobs, blob.entity_id());
                    erased += 1;
                }
            }
            Ok(erased)
        })
    }

    /// Revisions of a note, and attachments of the note and of those revisions
    fn owned_rows(
        &self,
        note_id: &str,
        doomed: &mut BTreeSet<(EntityName, String)>,
    ) -> TrellisResult<()> {
        let mut owners = vec![note_id.to_string()];
        for revision in self
            .store
            .scan(EntityName::Revisions, &ScanFilter::OwnedBy(note_id.to_string()))?
        {
            owners.push(revision.entity_id().to_string());
            doomed.insert((EntityName::Revisions, revision.entity_id().to_string()));
        }
        for owner in owners {
            for attachment in self
                .store
                .scan(EntityName::Attachments, &ScanFilter::OwnedBy(owner))?
            {
                doomed.insert((EntityName::Attachments, attachment.entity_id().to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{NewAttachment, NewNote};
    use crate::test_support::service;

    #[test]
    fn test_purge_erases_deleted_note_and_records_erasures() {
        let service = service();
        service
            .create_note(NewNote::new("root", "Gone").with_id("G").with_content("bye"), None)
            .unwrap();
        service.create_revision("G").unwrap();
        service
            .create_attachment(
                NewAttachment::new("G", "image", "image/png", "pic.png", b"png".to_vec()),
                None,
            )
            .unwrap();
        service.delete_note("G").unwrap();
        let cursor = service.changes_since(0, 10_000).unwrap().last().unwrap().id;

        let report = service.purge_deleted(chrono::Duration::zero()).unwrap();
        assert_eq!(report.notes, 1);
        assert_eq!(report.branches, 1);
        assert_eq!(report.revisions, 1);
        assert_eq!(report.attachments, 1);
        assert_eq!(report.blobs, 2);

        let store = service.store();
        assert!(store.get(EntityName::Notes, "G").unwrap().is_none());
        assert_eq!(store.row_count(EntityName::Revisions), 0);
        assert_eq!(store.row_count(EntityName::Attachments), 0);

        let erasures = service.changes_since(cursor, 10_000).unwrap();
        assert_eq!(erasures.len(), report.total());
        assert!(erasures.iter().all(|c| c.is_erased && !c.is_synced));
        assert_eq!(service.snapshot().unwrap().stats().revisions, 0);
    }

    #[test]
    fn test_recent_deletions_are_kept() {
        let service = service();
        service
            .create_note(NewNote::new("root", "Fresh").with_id("F"), None)
            .unwrap();
        service.delete_note("F").unwrap();

        let report = service.purge_deleted(chrono::Duration::days(1)).unwrap();
        assert_eq!(report, PurgeReport::default());
        assert!(service.store().get(EntityName::Notes, "F").unwrap().is_some());
    }

    #[test]
    fn test_unused_blobs_are_erased_shared_ones_kept() {
        let service = service();
        service
            .create_note(NewNote::new("root", "A").with_id("A").with_content("same"), None)
            .unwrap();
        service
            .create_note(NewNote::new("root", "B").with_id("B").with_content("same"), None)
            .unwrap();
        service.set_note_content("A", b"changed", None).unwrap();
        assert_eq!(service.erase_unused_blobs().unwrap(), 0);

        service.set_note_content("B", b"other", None).unwrap();
        assert_eq!(service.erase_unused_blobs().unwrap(), 1);
        assert_eq!(service.note_content("A", None).unwrap(), b"changed");
        assert_eq!(service.note_content("B", None).unwrap(), b"other");
    }
}
