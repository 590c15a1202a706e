use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use super::{RowStore, ScanFilter, StoreError, StoreResult, StoreTx};
use crate::entities::{EntityChange, EntityName, EntityRow, NewChange};

#[derive(Debug, Default, Clone)]
struct Table {
    rows: BTreeMap<i64, EntityRow>,
    ordinals: HashMap<String, i64>,
}

#[derive(Debug, Default, Clone)]
struct MemoryState {
    tables: HashMap<EntityName, Table>,
    changes: Vec<EntityChange>,
    next_ordinal: i64,
    next_change_id: i64,
}

impl MemoryState {
    fn get(&self, entity: EntityName, id: &str) -> Option<&EntityRow> {
        let table = self.tables.get(&entity)?;
        table.ordinals.get(id).and_then(|ord| table.rows.get(ord))
    }

    fn put(&mut self, row: &EntityRow) {
        let entity = row.entity_name();
        let table = self.tables.entry(entity).or_default();
        let ordinal = match table.ordinals.get(row.entity_id()) {
            Some(ord) => *ord,
            None => {
                self.next_ordinal += 1;
                table
                    .ordinals
                    .insert(row.entity_id().to_string(), self.next_ordinal);
                self.next_ordinal
            }
        };
        table.rows.insert(ordinal, row.clone());
    }

    fn erase(&mut self, entity: EntityName, id: &str) -> bool {
        let Some(table) = self.tables.get_mut(&entity) else {
            return false;
        };
        match table.ordinals.remove(id) {
            Some(ord) => table.rows.remove(&ord).is_some(),
            None => false,
        }
    }

    fn append_change(&mut self, change: NewChange) -> EntityChange {
        self.next_change_id += 1;
        let change = change.with_id(self.next_change_id);
        self.changes.push(change.clone());
        change
    }
}

/// Row store held in process memory
///
/// Transactions work on a copy of the whole state which replaces the original on commit.
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    state: RwLock<MemoryState>,
    fail_next_commit: AtomicBool,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next transaction fail at commit time, after its closure succeeded
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Number of stored rows of one kind, deleted included
    pub fn row_count(&self, entity: EntityName) -> usize {
        self.state
            .read()
            .tables
            .get(&entity)
            .map_or(0, |t| t.rows.len())
    }

    pub fn change_count(&self) -> usize {
        self.state.read().changes.len()
    }

    /// Insert rows directly, without change entries. Used to seed fixtures.
    pub fn seed(&self, rows: impl IntoIterator<Item = EntityRow>) {
        let mut state = self.state.write();
        for row in rows {
            state.put(&row);
        }
    }
}

struct MemoryTx {
    state: MemoryState,
}

impl StoreTx for MemoryTx {
    fn get(&self, entity: EntityName, id: &str) -> StoreResult<Option<EntityRow>> {
        Ok(self.state.get(entity, id).cloned())
    }

    fn put(&mut self, row: &EntityRow) -> StoreResult<()> {
        self.state.put(row);
        Ok(())
    }

    fn erase(&mut self, entity: EntityName, id: &str) -> StoreResult<bool> {
        Ok(self.state.erase(entity, id))
    }

    fn append_change(&mut self, change: NewChange) -> StoreResult<EntityChange> {
        Ok(self.state.append_change(change))
    }
}

impl RowStore for MemoryRowStore {
    fn get(&self, entity: EntityName, id: &str) -> StoreResult<Option<EntityRow>> {
        Ok(self.state.read().get(entity, id).cloned())
    }

    fn scan(&self, entity: EntityName, filter: &ScanFilter) -> StoreResult<Vec<EntityRow>> {
        filter.check(entity)?;
        let state = self.state.read();
        Ok(state
            .tables
            .get(&entity)
            .map(|t| {
                t.rows
                    .values()
                    .filter(|row| filter.matches(row))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn scan_page(
        &self,
        entity: EntityName,
        live_only: bool,
        after: Option<i64>,
        limit: usize,
    ) -> StoreResult<Vec<(i64, EntityRow)>> {
        let state = self.state.read();
        let Some(table) = state.tables.get(&entity) else {
            return Ok(Vec::new());
        };
        let start = after.map_or(i64::MIN, |a| a.saturating_add(1));
        Ok(table
            .rows
            .range(start..)
            .filter(|(_, row)| !live_only || !row.is_deleted())
            .take(limit)
            .map(|(ord, row)| (*ord, row.clone()))
            .collect())
    }

    fn changes_since(&self, cursor: i64, limit: usize) -> StoreResult<Vec<EntityChange>> {
        let state = self.state.read();
        Ok(state
            .changes
            .iter()
            .filter(|c| c.id > cursor)
            .take(limit)
            .cloned()
            .collect())
    }

    fn latest_change(&self, entity: EntityName, id: &str) -> StoreResult<Option<EntityChange>> {
        let state = self.state.read();
        Ok(state
            .changes
            .iter()
            .rev()
            .find(|c| c.entity_name == entity && c.entity_id == id)
            .cloned())
    }

    fn mark_changes_synced(&self, up_to: i64) -> StoreResult<usize> {
        let mut state = self.state.write();
        let mut marked = 0;
        for change in state.changes.iter_mut() {
            if change.id <= up_to && !change.is_synced {
                change.is_synced = true;
                marked += 1;
            }
        }
        Ok(marked)
    }

    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn StoreTx) -> Result<T, E>,
    {
        let mut guard = self.state.write();
        let mut tx = MemoryTx {
            state: guard.clone(),
        };
        let value = f(&mut tx)?;
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Transaction("commit failed".to_string()).into());
        }
        *guard = tx.state;
        Ok(value)
    }
}
