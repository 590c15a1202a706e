//! Change tracker
//!
//! Every committed mutation leaves one change entry per written row, appended inside the
//! writer's transaction. After commit the entries are broadcast to in-process
//! subscribers; replicas and other processes poll the feed by sequence instead.

use tokio::sync::broadcast;
use tracing::debug;

use crate::entities::{EntityChange, EntityName, EntityRow, NewChange};
use crate::hashing::erased_hash;
use crate::store::{StoreResult, StoreTx};
use crate::utils::{new_entity_id, utc_now};

pub struct ChangeTracker {
    instance_id: String,
    sender: broadcast::Sender<EntityChange>,
}

impl ChangeTracker {
    pub fn new(instance_id: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            instance_id: instance_id.into(),
            sender,
        }
    }

    /// Replica id stamped on local changes
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Record a local write of `row`. Rows that never leave this replica are recorded
    /// as already synced.
    pub fn record(&self, tx: &mut dyn StoreTx, row: &EntityRow) -> StoreResult<EntityChange> {
        tx.append_change(NewChange {
            entity_name: row.entity_name(),
            entity_id: row.entity_id().to_string(),
            hash: row.content_hash(),
            is_erased: false,
            change_id: new_entity_id(),
            instance_id: self.instance_id.clone(),
            is_synced: !row.is_synced(),
            utc_date_changed: utc_now(),
        })
    }

    /// Record the physical removal of a row
    pub fn record_erasure(
        &self,
        tx: &mut dyn StoreTx,
        entity: EntityName,
        entity_id: &str,
    ) -> StoreResult<EntityChange> {
        tx.append_change(NewChange {
            entity_name: entity,
            entity_id: entity_id.to_string(),
            hash: erased_hash(entity_id),
            is_erased: true,
            change_id: new_entity_id(),
            instance_id: self.instance_id.clone(),
            is_synced: false,
            utc_date_changed: utc_now(),
        })
    }

    /// Record a change received from another replica. Its identity and date are kept;
    /// nothing needs to be sent back.
    pub fn record_remote(
        &self,
        tx: &mut dyn StoreTx,
        change: &EntityChange,
    ) -> StoreResult<EntityChange> {
        tx.append_change(NewChange {
            entity_name: change.entity_name,
            entity_id: change.entity_id.clone(),
            hash: change.hash.clone(),
            is_erased: change.is_erased,
            change_id: change.change_id.clone(),
            instance_id: change.instance_id.clone(),
            is_synced: true,
            utc_date_changed: change.utc_date_changed.clone(),
        })
    }

    /// Broadcast committed entries
    pub fn publish(&self, changes: &[EntityChange]) {
        for change in changes {
            // No receivers is fine
            let _ = self.sender.send(change.clone());
        }
        if let Some(last) = changes.last() {
            debug!(count = changes.len(), last_id = last.id, "Published changes");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EntityChange> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::OptionRow;
    use crate::store::{MemoryRowStore, RowStore};
    use crate::test_support::{note, T0};

    fn option(is_synced: bool) -> EntityRow {
        EntityRow::Option(OptionRow {
            name: "theme".into(),
            value: "dark".into(),
            is_synced,
            utc_date_modified: T0.into(),
        })
    }

    #[test]
    fn test_record_uses_content_hash_and_instance() {
        let store = MemoryRowStore::new();
        let tracker = ChangeTracker::new("laptop", 16);
        let row = note("n1", "Hello");

        let change = store
            .transaction(|tx| {
                tx.put(&row)?;
                tracker.record(tx, &row)
            })
            .unwrap();

        assert_eq!(change.id, 1);
        assert_eq!(change.hash, row.content_hash());
        assert_eq!(change.instance_id, "laptop");
        assert!(!change.is_synced);
        assert_eq!(store.latest_change(EntityName::Notes, "n1").unwrap(), Some(change));
    }

    #[test]
    fn test_local_only_rows_need_no_sync() {
        let store = MemoryRowStore::new();
        let tracker = ChangeTracker::new("laptop", 16);
        let synced = store
            .transaction(|tx| tracker.record(tx, &option(true)))
            .unwrap();
        let local = store
            .transaction(|tx| tracker.record(tx, &option(false)))
            .unwrap();
        assert!(!synced.is_synced);
        assert!(local.is_synced);
    }

    #[test]
    fn test_remote_change_keeps_identity() {
        let store = MemoryRowStore::new();
        let tracker = ChangeTracker::new("laptop", 16);
        let remote = EntityChange {
            id: 99,
            entity_name: EntityName::Notes,
            entity_id: "n1".into(),
            hash: "abc".into(),
            is_erased: false,
            change_id: "remote-change".into(),
            instance_id: "phone".into(),
            is_synced: false,
            utc_date_changed: T0.into(),
        };

        let recorded = store
            .transaction(|tx| tracker.record_remote(tx, &remote))
            .unwrap();
        assert_eq!(recorded.id, 1);
        assert_eq!(recorded.change_id, "remote-change");
        assert_eq!(recorded.instance_id, "phone");
        assert!(recorded.is_synced);
    }

    #[test]
    fn test_erasure_is_flagged() {
        let store = MemoryRowStore::new();
        let tracker = ChangeTracker::new("laptop", 16);
        let change = store
            .transaction(|tx| tracker.record_erasure(tx, EntityName::Blobs, "b1"))
            .unwrap();
        assert!(change.is_erased);
        assert_eq!(change.hash, erased_hash("b1"));
    }

    #[tokio::test]
    async fn test_subscribers_receive_published_changes() {
        let store = MemoryRowStore::new();
        let tracker = ChangeTracker::new("laptop", 16);
        let mut rx = tracker.subscribe();

        let change = store
            .transaction(|tx| tracker.record(tx, &note("n1", "Hello")))
            .unwrap();
        tracker.publish(std::slice::from_ref(&change));

        assert_eq!(rx.recv().await.unwrap(), change);
    }
}
