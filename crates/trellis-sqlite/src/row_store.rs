//! [`RowStore`] on SQLite

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::{debug, warn};
use trellis_config::StorageConfig;
use trellis_core::{
    EntityChange, EntityName, EntityRow, NewChange, RowStore, ScanFilter, StoreError,
    StoreResult, StoreTx,
};

use crate::connection::SqlitePool;
use crate::error::SqliteResult;
use crate::schema;
use crate::tables::{self, read_change, read_row, row_values, CHANGE_COLUMNS};

/// Durable row store and change feed in one SQLite database
#[derive(Clone)]
pub struct SqliteRowStore {
    pool: SqlitePool,
}

impl SqliteRowStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn open(config: &StorageConfig) -> SqliteResult<Self> {
        Ok(Self::new(SqlitePool::new(config.clone())?))
    }

    /// In-memory database for tests
    pub fn memory() -> SqliteResult<Self> {
        Ok(Self::new(SqlitePool::memory()?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// On-disk footprint and sync backlog
    pub fn storage_stats(&self) -> SqliteResult<StorageStats> {
        self.pool.with_connection(|conn| {
            let (database_bytes, reclaimable_bytes): (i64, i64) = conn.query_row(
                "SELECT c.page_count * s.page_size, f.freelist_count * s.page_size
                 FROM pragma_page_count() c, pragma_page_size() s, pragma_freelist_count() f",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let (blobs, blob_bytes): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(content_length), 0) FROM blobs",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let pending_changes: i64 = conn.query_row(
                "SELECT COUNT(*) FROM entity_changes WHERE is_synced = 0",
                [],
                |row| row.get(0),
            )?;
            Ok(StorageStats {
                schema_version: schema::current_version(conn)?,
                database_bytes: database_bytes as u64,
                reclaimable_bytes: reclaimable_bytes as u64,
                blobs: blobs as u64,
                blob_bytes: blob_bytes as u64,
                pending_changes: pending_changes as u64,
            })
        })
    }
}

/// What [`SqliteRowStore::storage_stats`] reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    pub schema_version: i32,
    pub database_bytes: u64,
    /// Free pages a `VACUUM` would return
    pub reclaimable_bytes: u64,
    pub blobs: u64,
    pub blob_bytes: u64,
    /// Change entries not yet acknowledged by a replica
    pub pending_changes: u64,
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn get_row(conn: &Connection, entity: EntityName, id: &str) -> SqliteResult<Option<EntityRow>> {
    let mut stmt = conn.prepare_cached(&tables::spec(entity).select_by_key())?;
    let row = stmt
        .query_row([id], |row| read_row(entity, row))
        .optional()?;
    Ok(row.map(|(_, row)| row))
}

fn put_row(conn: &Connection, row: &EntityRow) -> SqliteResult<()> {
    let mut stmt = conn.prepare_cached(&tables::spec(row.entity_name()).upsert())?;
    stmt.execute(params_from_iter(row_values(row)))?;
    Ok(())
}

fn erase_row(conn: &Connection, entity: EntityName, id: &str) -> SqliteResult<bool> {
    let mut stmt = conn.prepare_cached(&tables::spec(entity).delete_by_key())?;
    Ok(stmt.execute([id])? > 0)
}

fn insert_change(conn: &Connection, change: NewChange) -> SqliteResult<EntityChange> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO entity_changes
            (entity_name, entity_id, hash, is_erased, change_id, instance_id, is_synced, utc_date_changed)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    stmt.execute(params![
        change.entity_name.as_str(),
        change.entity_id,
        change.hash,
        change.is_erased,
        change.change_id,
        change.instance_id,
        change.is_synced,
        change.utc_date_changed,
    ])?;
    Ok(change.with_id(conn.last_insert_rowid()))
}

/// Writes of one open SQLite transaction
struct SqliteTx<'a> {
    conn: &'a Connection,
}

impl StoreTx for SqliteTx<'_> {
    fn get(&self, entity: EntityName, id: &str) -> StoreResult<Option<EntityRow>> {
        Ok(get_row(self.conn, entity, id)?)
    }

    fn put(&mut self, row: &EntityRow) -> StoreResult<()> {
        Ok(put_row(self.conn, row)?)
    }

    fn erase(&mut self, entity: EntityName, id: &str) -> StoreResult<bool> {
        Ok(erase_row(self.conn, entity, id)?)
    }

    fn append_change(&mut self, change: NewChange) -> StoreResult<EntityChange> {
        Ok(insert_change(self.conn, change)?)
    }
}

impl RowStore for SqliteRowStore {
    fn get(&self, entity: EntityName, id: &str) -> StoreResult<Option<EntityRow>> {
        Ok(self.pool.with_connection(|conn| get_row(conn, entity, id))?)
    }

    fn scan(&self, entity: EntityName, filter: &ScanFilter) -> StoreResult<Vec<EntityRow>> {
        if !filter.applies_to(entity) {
            return Err(StoreError::UnsupportedFilter {
                entity,
                filter: filter.to_string(),
            });
        }
        let (sql, param) = tables::spec(entity).scan(filter);
        let rows = self.pool.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(param.iter()), |row| read_row(entity, row))?
                .map(|r| r.map(|(_, row)| row))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        Ok(rows)
    }

    fn scan_page(
        &self,
        entity: EntityName,
        live_only: bool,
        after: Option<i64>,
        limit: usize,
    ) -> StoreResult<Vec<(i64, EntityRow)>> {
        let sql = tables::spec(entity).page(live_only);
        let page = self.pool.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt
                .query_map(
                    params![after.unwrap_or(i64::MIN), limit_param(limit)],
                    |row| read_row(entity, row),
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        Ok(page)
    }

    fn changes_since(&self, cursor: i64, limit: usize) -> StoreResult<Vec<EntityChange>> {
        let changes = self.pool.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM entity_changes WHERE id > ?1 ORDER BY id LIMIT ?2",
                CHANGE_COLUMNS
            ))?;
            let changes = stmt
                .query_map(params![cursor, limit_param(limit)], read_change)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(changes)
        })?;
        Ok(changes)
    }

    fn latest_change(&self, entity: EntityName, id: &str) -> StoreResult<Option<EntityChange>> {
        let change = self.pool.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM entity_changes
                 WHERE entity_name = ?1 AND entity_id = ?2
                 ORDER BY id DESC LIMIT 1",
                CHANGE_COLUMNS
            ))?;
            Ok(stmt
                .query_row(params![entity.as_str(), id], read_change)
                .optional()?)
        })?;
        Ok(change)
    }

    fn mark_changes_synced(&self, up_to: i64) -> StoreResult<usize> {
        let marked = self.pool.with_connection(|conn| {
            Ok(conn.execute(
                "UPDATE entity_changes SET is_synced = 1 WHERE id <= ?1 AND is_synced = 0",
                [up_to],
            )?)
        })?;
        debug!(up_to, marked, "Marked changes synced");
        Ok(marked)
    }

    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn StoreTx) -> Result<T, E>,
    {
        let mut conn = self.pool.lock();
        let tx = conn
            .transaction()
            .map_err(|e| E::from(StoreError::Transaction(e.to_string())))?;

        // Dropping `tx` on the error path rolls back
        let out = f(&mut SqliteTx { conn: &tx })?;

        tx.commit().map_err(|e| {
            warn!(error = %e, "SQLite commit failed");
            E::from(StoreError::Transaction(e.to_string()))
        })?;
        Ok(out)
    }
}
