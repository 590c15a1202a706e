//! Row store abstraction
//!
//! The durable store is a keyed row store with point reads, predicate scans and one
//! transaction per mutation. [`MemoryRowStore`] backs tests; `trellis-sqlite` provides
//! the on-disk implementation.

mod error;
mod memory;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryRowStore;

use std::fmt;

use crate::entities::{EntityChange, EntityName, EntityRow, NewChange};

/// Predicate for [`RowStore::scan`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanFilter {
    All,
    /// Rows not soft-deleted
    Live,
    /// Soft-deleted rows only
    Deleted,
    /// Live branches under a parent note
    ChildrenOf(String),
    /// Live attributes, revisions or attachments of an owner
    OwnedBy(String),
}

impl ScanFilter {
    /// Whether the filter can be applied to rows of `entity`
    pub fn applies_to(&self, entity: EntityName) -> bool {
        match self {
            ScanFilter::All | ScanFilter::Live => true,
            ScanFilter::Deleted => entity.is_soft_deletable(),
            ScanFilter::ChildrenOf(_) => entity == EntityName::Branches,
            ScanFilter::OwnedBy(_) => matches!(
                entity,
                EntityName::Attributes | EntityName::Revisions | EntityName::Attachments
            ),
        }
    }

    pub fn matches(&self, row: &EntityRow) -> bool {
        match self {
            ScanFilter::All => true,
            ScanFilter::Live => !row.is_deleted(),
            ScanFilter::Deleted => row.is_deleted(),
            ScanFilter::ChildrenOf(parent) => {
                !row.is_deleted() && row.parent_note_id() == Some(parent.as_str())
            }
            ScanFilter::OwnedBy(owner) => {
                !row.is_deleted() && row.owner_id() == Some(owner.as_str())
            }
        }
    }

    pub(crate) fn check(&self, entity: EntityName) -> StoreResult<()> {
        if self.applies_to(entity) {
            Ok(())
        } else {
            Err(StoreError::UnsupportedFilter {
                entity,
                filter: self.to_string(),
            })
        }
    }
}

impl fmt::Display for ScanFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanFilter::All => write!(f, "all"),
            ScanFilter::Live => write!(f, "live"),
            ScanFilter::Deleted => write!(f, "deleted"),
            ScanFilter::ChildrenOf(parent) => write!(f, "children of {}", parent),
            ScanFilter::OwnedBy(owner) => write!(f, "owned by {}", owner),
        }
    }
}

/// Writes inside one store transaction
pub trait StoreTx {
    fn get(&self, entity: EntityName, id: &str) -> StoreResult<Option<EntityRow>>;

    /// Insert or replace. Replacing keeps the row's insertion ordinal.
    fn put(&mut self, row: &EntityRow) -> StoreResult<()>;

    /// Physically remove a row. Returns whether it existed.
    fn erase(&mut self, entity: EntityName, id: &str) -> StoreResult<bool>;

    /// Append a change entry; the store assigns the next sequence
    fn append_change(&mut self, change: NewChange) -> StoreResult<EntityChange>;
}

/// Durable store of entity rows and the change feed
pub trait RowStore: Send + Sync + 'static {
    fn get(&self, entity: EntityName, id: &str) -> StoreResult<Option<EntityRow>>;

    /// Rows matching `filter`, in insertion order
    fn scan(&self, entity: EntityName, filter: &ScanFilter) -> StoreResult<Vec<EntityRow>>;

    /// Keyset page of rows after insertion ordinal `after`, with their ordinals
    fn scan_page(
        &self,
        entity: EntityName,
        live_only: bool,
        after: Option<i64>,
        limit: usize,
    ) -> StoreResult<Vec<(i64, EntityRow)>>;

    /// Change entries with a sequence greater than `cursor`, ascending
    fn changes_since(&self, cursor: i64, limit: usize) -> StoreResult<Vec<EntityChange>>;

    fn latest_change(&self, entity: EntityName, id: &str) -> StoreResult<Option<EntityChange>>;

    /// Flag every change up to and including `up_to` as synced
    fn mark_changes_synced(&self, up_to: i64) -> StoreResult<usize>;

    /// Run `f` in one transaction. Committed only when `f` returns `Ok`.
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn StoreTx) -> Result<T, E>;
}
