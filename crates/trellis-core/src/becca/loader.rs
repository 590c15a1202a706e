use tracing::{debug, error, warn};

use super::BeccaSnapshot;
use crate::entities::{EntityName, EntityRow};
use crate::error::{TrellisError, TrellisResult};
use crate::protected::SessionToken;
use crate::store::{RowStore, ScanFilter};

/// Kinds read at load time. Blob contents stay in the store.
const LOAD_ORDER: [EntityName; 6] = [
    EntityName::Options,
    EntityName::Notes,
    EntityName::Branches,
    EntityName::Attributes,
    EntityName::Revisions,
    EntityName::Attachments,
];

struct SnapshotBuilder<'t> {
    snapshot: BeccaSnapshot,
    token: Option<&'t SessionToken>,
}

impl<'t> SnapshotBuilder<'t> {
    fn new(token: Option<&'t SessionToken>) -> Self {
        Self {
            snapshot: BeccaSnapshot::default(),
            token,
        }
    }

    fn add(&mut self, row: EntityRow) {
        self.snapshot.apply_row(row, self.token);
    }

    fn finish(self) -> TrellisResult<BeccaSnapshot> {
        validate(&self.snapshot)?;
        Ok(self.snapshot)
    }
}

/// Dangling branches and attributes make the graph unusable; orphaned revisions and
/// attachments are only reported.
fn validate(snapshot: &BeccaSnapshot) -> TrellisResult<()> {
    for branch in snapshot.branches.values() {
        if !snapshot.has_note(&branch.note_id) {
            return Err(corruption(format!(
                "branch {} references missing note {}",
                branch.branch_id, branch.note_id
            )));
        }
        if !snapshot.has_note(&branch.parent_note_id) {
            return Err(corruption(format!(
                "branch {} references missing parent note {}",
                branch.branch_id, branch.parent_note_id
            )));
        }
    }

    for attribute in snapshot.attributes.values() {
        if !snapshot.has_note(&attribute.note_id) {
            return Err(corruption(format!(
                "attribute {} references missing owner note {}",
                attribute.attribute_id, attribute.note_id
            )));
        }
    }

    for revision in snapshot.revisions.values() {
        if !snapshot.has_note(&revision.note_id) {
            warn!(revision_id = %revision.revision_id, note_id = %revision.note_id, "Revision of missing note");
        }
    }
    for attachment in snapshot.attachments.values() {
        let owner = &attachment.owner_id;
        if !snapshot.has_note(owner) && !snapshot.revisions.contains_key(owner) {
            warn!(attachment_id = %attachment.attachment_id, owner_id = %owner, "Attachment of missing owner");
        }
    }
    Ok(())
}

fn corruption(detail: String) -> TrellisError {
    error!(%detail, "Note cache load aborted");
    TrellisError::Corruption(detail)
}

pub(super) fn load_snapshot<S: RowStore>(
    store: &S,
    token: Option<&SessionToken>,
) -> TrellisResult<BeccaSnapshot> {
    let mut builder = SnapshotBuilder::new(token);
    for entity in LOAD_ORDER {
        let rows = store.scan(entity, &ScanFilter::Live)?;
        debug!(%entity, count = rows.len(), "Loaded rows");
        for row in rows {
            builder.add(row);
        }
    }
    builder.finish()
}

/// Same result as [`load_snapshot`], read in keyset pages with a yield to the runtime
/// after each page
pub(super) async fn load_snapshot_incremental<S: RowStore>(
    store: &S,
    batch_size: usize,
    token: Option<&SessionToken>,
) -> TrellisResult<BeccaSnapshot> {
    let batch_size = batch_size.max(1);
    let mut builder = SnapshotBuilder::new(token);

    for entity in LOAD_ORDER {
        let mut after = None;
        let mut batches = 0usize;
        loop {
            let page = store.scan_page(entity, true, after, batch_size)?;
            let full = page.len() == batch_size;
            after = page.last().map(|(ordinal, _)| *ordinal);
            for (_, row) in page {
                builder.add(row);
            }
            batches += 1;
            tokio::task::yield_now().await;
            if !full {
                break;
            }
        }
        debug!(%entity, batches, "Loaded rows incrementally");
    }
    builder.finish()
}
