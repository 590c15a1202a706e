use serde::{Deserialize, Serialize};

use super::kinds::EntityName;

/// One committed mutation, as recorded in the change feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityChange {
    /// Local, monotonically increasing sequence
    pub id: i64,
    pub entity_name: EntityName,
    pub entity_id: String,
    /// Canonical content hash of the entity after the mutation
    pub hash: String,
    /// The entity was physically removed
    pub is_erased: bool,
    /// Globally unique id of the change, preserved across replicas
    pub change_id: String,
    /// Replica that produced the change
    pub instance_id: String,
    /// Nothing remains to send to the peer for this entry
    pub is_synced: bool,
    pub utc_date_changed: String,
}

/// A change entry before the store assigns its sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChange {
    pub entity_name: EntityName,
    pub entity_id: String,
    pub hash: String,
    pub is_erased: bool,
    pub change_id: String,
    pub instance_id: String,
    pub is_synced: bool,
    pub utc_date_changed: String,
}

impl NewChange {
    /// Attach the sequence the store assigned
    pub fn with_id(self, id: i64) -> EntityChange {
        EntityChange {
            id,
            entity_name: self.entity_name,
            entity_id: self.entity_id,
            hash: self.hash,
            is_erased: self.is_erased,
            change_id: self.change_id,
            instance_id: self.instance_id,
            is_synced: self.is_synced,
            utc_date_changed: self.utc_date_changed,
        }
    }
}
