//! Schema management and migrations

use crate::error::{SqliteError, SqliteResult};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

/// Schema version - increment when making schema changes
pub const SCHEMA_VERSION: i32 = 1;

/// Apply all pending migrations
pub fn apply_migrations(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version = current_version(conn)?;
    debug!(current_version, target_version = SCHEMA_VERSION, "Checking migrations");

    if current_version > SCHEMA_VERSION {
        return Err(SqliteError::Schema(format!(
            "database schema v{} is newer than this build (v{})",
            current_version, SCHEMA_VERSION
        )));
    }
    if current_version < 1 {
        info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Applying schema migrations"
        );
        apply_migration_v1(conn)?;
    }

    Ok(())
}

/// Get current schema version
pub fn current_version(conn: &Connection) -> SqliteResult<i32> {
    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .optional()?
        .flatten();

    Ok(version.unwrap_or(0))
}

fn record_migration(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration v1: entity tables and the change feed
fn apply_migration_v1(conn: &Connection) -> SqliteResult<()> {
    debug!("Applying migration v1: entity tables and change feed");

    conn.execute_batch(SCHEMA_V1)
        .map_err(|e| SqliteError::Schema(format!("Failed to apply v1 schema: {}", e)))?;

    record_migration(conn, 1)?;
    info!("Migration v1 applied successfully");
    Ok(())
}

/// Initial schema SQL
const SCHEMA_V1: &str = r#"
-- Rows keep their rowid on upsert; scans and keyset pages order by it.

CREATE TABLE IF NOT EXISTS notes (
    note_id TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    type TEXT NOT NULL DEFAULT 'text',
    mime TEXT NOT NULL DEFAULT 'text/html',
    is_protected INTEGER NOT NULL DEFAULT 0,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    blob_id TEXT NOT NULL,
    date_created TEXT NOT NULL,
    date_modified TEXT NOT NULL,
    utc_date_created TEXT NOT NULL,
    utc_date_modified TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS branches (
    branch_id TEXT PRIMARY KEY NOT NULL,
    note_id TEXT NOT NULL,
    parent_note_id TEXT NOT NULL,
    prefix TEXT,
    note_position INTEGER NOT NULL DEFAULT 0,
    is_expanded INTEGER NOT NULL DEFAULT 0,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    utc_date_modified TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_branches_note ON branches(note_id);
CREATE INDEX IF NOT EXISTS idx_branches_parent ON branches(parent_note_id, is_deleted);

CREATE TABLE IF NOT EXISTS attributes (
    attribute_id TEXT PRIMARY KEY NOT NULL,
    note_id TEXT NOT NULL,
    type TEXT NOT NULL CHECK (type IN ('label', 'relation')),
    name TEXT NOT NULL,
    value TEXT NOT NULL DEFAULT '',
    position INTEGER NOT NULL DEFAULT 0,
    is_inheritable INTEGER NOT NULL DEFAULT 0,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    utc_date_modified TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_attributes_note ON attributes(note_id);
CREATE INDEX IF NOT EXISTS idx_attributes_name ON attributes(name, value);

CREATE TABLE IF NOT EXISTS revisions (
    revision_id TEXT PRIMARY KEY NOT NULL,
    note_id TEXT NOT NULL,
    type TEXT NOT NULL,
    mime TEXT NOT NULL,
    is_protected INTEGER NOT NULL DEFAULT 0,
    title TEXT NOT NULL,
    blob_id TEXT NOT NULL,
    date_last_edited TEXT NOT NULL,
    date_created TEXT NOT NULL,
    utc_date_last_edited TEXT NOT NULL,
    utc_date_created TEXT NOT NULL,
    utc_date_modified TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_revisions_note ON revisions(note_id);

CREATE TABLE IF NOT EXISTS attachments (
    attachment_id TEXT PRIMARY KEY NOT NULL,
    owner_id TEXT NOT NULL,
    role TEXT NOT NULL,
    mime TEXT NOT NULL,
    title TEXT NOT NULL,
    position INTEGER NOT NULL DEFAULT 0,
    blob_id TEXT NOT NULL,
    is_protected INTEGER NOT NULL DEFAULT 0,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    date_modified TEXT NOT NULL,
    utc_date_modified TEXT NOT NULL,
    utc_date_scheduled_for_erasure_since TEXT
);
CREATE INDEX IF NOT EXISTS idx_attachments_owner ON attachments(owner_id);

CREATE TABLE IF NOT EXISTS blobs (
    blob_id TEXT PRIMARY KEY NOT NULL,
    content BLOB NOT NULL,
    content_length INTEGER NOT NULL,
    date_modified TEXT NOT NULL,
    utc_date_modified TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS options (
    name TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    is_synced INTEGER NOT NULL DEFAULT 0,
    utc_date_modified TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS entity_changes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_name TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    hash TEXT NOT NULL,
    is_erased INTEGER NOT NULL DEFAULT 0,
    change_id TEXT NOT NULL,
    instance_id TEXT NOT NULL,
    is_synced INTEGER NOT NULL DEFAULT 0,
    utc_date_changed TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entity_changes_entity ON entity_changes(entity_name, entity_id);
CREATE INDEX IF NOT EXISTS idx_entity_changes_unsynced ON entity_changes(is_synced, id);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap();
        let rows = stmt.query_map([], |row| row.get(0)).unwrap();
        rows.filter_map(Result::ok).collect()
    }

    #[test]
    fn test_schema_applies_cleanly() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();

        let tables = tables(&conn);
        for expected in [
            "notes",
            "branches",
            "attributes",
            "revisions",
            "attachments",
            "blobs",
            "options",
            "entity_changes",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {}", expected);
        }
        assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        apply_migrations(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        record_migration(&conn, SCHEMA_VERSION + 1).unwrap();

        assert!(matches!(
            apply_migrations(&conn),
            Err(SqliteError::Schema(_))
        ));
    }
}
