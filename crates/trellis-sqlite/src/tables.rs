//! Mapping between entity rows and their tables

use rusqlite::types::{Type, Value};
use rusqlite::Row;
use std::str::FromStr;
use trellis_core::{
    AttachmentRow, Attribute, BlobRow, Branch, EntityChange, EntityName, EntityRow, NoteRow,
    OptionRow, RevisionRow, ScanFilter,
};

/// Table layout of one entity kind
pub(crate) struct TableSpec {
    pub name: &'static str,
    pub key: &'static str,
    pub columns: &'static [&'static str],
    pub soft_delete: bool,
    /// Column holding the owner for `ScanFilter::OwnedBy`
    pub owner: Option<&'static str>,
}

const NOTES: TableSpec = TableSpec {
    name: "notes",
    key: "note_id",
    columns: &[
        "note_id",
        "title",
        "type",
        "mime",
        "is_protected",
        "is_deleted",
        "blob_id",
        "date_created",
        "date_modified",
        "utc_date_created",
        "utc_date_modified",
    ],
    soft_delete: true,
    owner: None,
};

const BRANCHES: TableSpec = TableSpec {
    name: "branches",
    key: "branch_id",
    columns: &[
        "branch_id",
        "note_id",
        "parent_note_id",
        "prefix",
        "note_position",
        "is_expanded",
        "is_deleted",
        "utc_date_modified",
    ],
    soft_delete: true,
    owner: None,
};

const ATTRIBUTES: TableSpec = TableSpec {
    name: "attributes",
    key: "attribute_id",
    columns: &[
        "attribute_id",
        "note_id",
        "type",
        "name",
        "value",
        "position",
        "is_inheritable",
        "is_deleted",
        "utc_date_modified",
    ],
    soft_delete: true,
    owner: Some("note_id"),
};

const REVISIONS: TableSpec = TableSpec {
    name: "revisions",
    key: "revision_id",
    columns: &[
        "revision_id",
        "note_id",
        "type",
        "mime",
        "is_protected",
        "title",
        "blob_id",
        "date_last_edited",
        "date_created",
        "utc_date_last_edited",
        "utc_date_created",
        "utc_date_modified",
    ],
    soft_delete: false,
    owner: Some("note_id"),
};

const ATTACHMENTS: TableSpec = TableSpec {
    name: "attachments",
    key: "attachment_id",
    columns: &[
        "attachment_id",
        "owner_id",
        "role",
        "mime",
        "title",
        "position",
        "blob_id",
        "is_protected",
        "is_deleted",
        "date_modified",
        "utc_date_modified",
        "utc_date_scheduled_for_erasure_since",
    ],
    soft_delete: true,
    owner: Some("owner_id"),
};

const BLOBS: TableSpec = TableSpec {
    name: "blobs",
    key: "blob_id",
    columns: &[
        "blob_id",
        "content",
        "content_length",
        "date_modified",
        "utc_date_modified",
    ],
    soft_delete: false,
    owner: None,
};

const OPTIONS: TableSpec = TableSpec {
    name: "options",
    key: "name",
    columns: &["name", "value", "is_synced", "utc_date_modified"],
    soft_delete: false,
    owner: None,
};

pub(crate) fn spec(entity: EntityName) -> &'static TableSpec {
    match entity {
        EntityName::Notes => &NOTES,
        EntityName::Branches => &BRANCHES,
        EntityName::Attributes => &ATTRIBUTES,
        EntityName::Revisions => &REVISIONS,
        EntityName::Attachments => &ATTACHMENTS,
        EntityName::Blobs => &BLOBS,
        EntityName::Options => &OPTIONS,
    }
}

impl TableSpec {
    fn column_list(&self) -> String {
        self.columns.join(", ")
    }

    pub fn select_by_key(&self) -> String {
        format!(
            "SELECT rowid AS ordinal, {} FROM {} WHERE {} = ?1",
            self.column_list(),
            self.name,
            self.key
        )
    }

    /// Insert or replace in place, keeping the rowid
    pub fn upsert(&self) -> String {
        let placeholders: Vec<String> = (1..=self.columns.len()).map(|i| format!("?{}", i)).collect();
        let updates: Vec<String> = self
            .columns
            .iter()
            .filter(|c| **c != self.key)
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) DO UPDATE SET {}",
            self.name,
            self.column_list(),
            placeholders.join(", "),
            self.key,
            updates.join(", ")
        )
    }

    pub fn delete_by_key(&self) -> String {
        format!("DELETE FROM {} WHERE {} = ?1", self.name, self.key)
    }

    /// Scan query and its single optional parameter
    pub fn scan(&self, filter: &ScanFilter) -> (String, Option<String>) {
        let live = if self.soft_delete { "is_deleted = 0" } else { "1 = 1" };
        let (clause, param) = match filter {
            ScanFilter::All => ("1 = 1".to_string(), None),
            ScanFilter::Live => (live.to_string(), None),
            ScanFilter::Deleted => ("is_deleted = 1".to_string(), None),
            ScanFilter::ChildrenOf(parent) => (
                format!("{} AND parent_note_id = ?1", live),
                Some(parent.clone()),
            ),
            ScanFilter::OwnedBy(owner) => (
                format!("{} AND {} = ?1", live, self.owner.unwrap_or(self.key)),
                Some(owner.clone()),
            ),
        };
        (
            format!(
                "SELECT rowid AS ordinal, {} FROM {} WHERE {} ORDER BY rowid",
                self.column_list(),
                self.name,
                clause
            ),
            param,
        )
    }

    pub fn page(&self, live_only: bool) -> String {
        let live = if live_only && self.soft_delete {
            " AND is_deleted = 0"
        } else {
            ""
        };
        format!(
            "SELECT rowid AS ordinal, {} FROM {} WHERE rowid > ?1{} ORDER BY rowid LIMIT ?2",
            self.column_list(),
            self.name,
            live
        )
    }
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn opt_text(value: &Option<String>) -> Value {
    value.as_deref().map_or(Value::Null, text)
}

fn flag(value: bool) -> Value {
    Value::Integer(i64::from(value))
}

/// Column values in `TableSpec::columns` order
pub(crate) fn row_values(row: &EntityRow) -> Vec<Value> {
    match row {
        EntityRow::Note(n) => vec![
            text(&n.note_id),
            text(&n.title),
            text(n.note_type.as_str()),
            text(&n.mime),
            flag(n.is_protected),
            flag(n.is_deleted),
            text(&n.blob_id),
            text(&n.date_created),
            text(&n.date_modified),
            text(&n.utc_date_created),
            text(&n.utc_date_modified),
        ],
        EntityRow::Branch(b) => vec![
            text(&b.branch_id),
            text(&b.note_id),
            text(&b.parent_note_id),
            opt_text(&b.prefix),
            Value::Integer(b.note_position),
            flag(b.is_expanded),
            flag(b.is_deleted),
            text(&b.utc_date_modified),
        ],
        EntityRow::Attribute(a) => vec![
            text(&a.attribute_id),
            text(&a.note_id),
            text(a.attribute_type.as_str()),
            text(&a.name),
            text(&a.value),
            Value::Integer(a.position),
            flag(a.is_inheritable),
            flag(a.is_deleted),
            text(&a.utc_date_modified),
        ],
        EntityRow::Revision(r) => vec![
            text(&r.revision_id),
            text(&r.note_id),
            text(r.note_type.as_str()),
            text(&r.mime),
            flag(r.is_protected),
            text(&r.title),
            text(&r.blob_id),
            text(&r.date_last_edited),
            text(&r.date_created),
            text(&r.utc_date_last_edited),
            text(&r.utc_date_created),
            text(&r.utc_date_modified),
        ],
        EntityRow::Attachment(a) => vec![
            text(&a.attachment_id),
            text(&a.owner_id),
            text(&a.role),
            text(&a.mime),
            text(&a.title),
            Value::Integer(a.position),
            text(&a.blob_id),
            flag(a.is_protected),
            flag(a.is_deleted),
            text(&a.date_modified),
            text(&a.utc_date_modified),
            opt_text(&a.utc_date_scheduled_for_erasure_since),
        ],
        EntityRow::Blob(b) => vec![
            text(&b.blob_id),
            Value::Blob(b.content.clone()),
            Value::Integer(b.content_length),
            text(&b.date_modified),
            text(&b.utc_date_modified),
        ],
        EntityRow::Option(o) => vec![
            text(&o.name),
            text(&o.value),
            flag(o.is_synced),
            text(&o.utc_date_modified),
        ],
    }
}

fn parse<T>(row: &Row<'_>, column: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(column)?;
    let index = row.as_ref().column_index(column)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

/// Read a row selected with its `ordinal` followed by the table's columns
pub(crate) fn read_row(entity: EntityName, row: &Row<'_>) -> rusqlite::Result<(i64, EntityRow)> {
    let ordinal: i64 = row.get("ordinal")?;
    let entity_row = match entity {
        EntityName::Notes => EntityRow::Note(NoteRow {
            note_id: row.get("note_id")?,
            title: row.get("title")?,
            note_type: parse(row, "type")?,
            mime: row.get("mime")?,
            is_protected: row.get("is_protected")?,
            is_deleted: row.get("is_deleted")?,
            blob_id: row.get("blob_id")?,
            date_created: row.get("date_created")?,
            date_modified: row.get("date_modified")?,
            utc_date_created: row.get("utc_date_created")?,
            utc_date_modified: row.get("utc_date_modified")?,
        }),
        EntityName::Branches => EntityRow::Branch(Branch {
            branch_id: row.get("branch_id")?,
            note_id: row.get("note_id")?,
            parent_note_id: row.get("parent_note_id")?,
            prefix: row.get("prefix")?,
            note_position: row.get("note_position")?,
            is_expanded: row.get("is_expanded")?,
            is_deleted: row.get("is_deleted")?,
            utc_date_modified: row.get("utc_date_modified")?,
        }),
        EntityName::Attributes => EntityRow::Attribute(Attribute {
            attribute_id: row.get("attribute_id")?,
            note_id: row.get("note_id")?,
            attribute_type: parse(row, "type")?,
            name: row.get("name")?,
            value: row.get("value")?,
            position: row.get("position")?,
            is_inheritable: row.get("is_inheritable")?,
            is_deleted: row.get("is_deleted")?,
            utc_date_modified: row.get("utc_date_modified")?,
        }),
        EntityName::Revisions => EntityRow::Revision(RevisionRow {
            revision_id: row.get("revision_id")?,
            note_id: row.get("note_id")?,
            note_type: parse(row, "type")?,
            mime: row.get("mime")?,
            is_protected: row.get("is_protected")?,
            title: row.get("title")?,
            blob_id: row.get("blob_id")?,
            date_last_edited: row.get("date_last_edited")?,
            date_created: row.get("date_created")?,
            utc_date_last_edited: row.get("utc_date_last_edited")?,
            utc_date_created: row.get("utc_date_created")?,
            utc_date_modified: row.get("utc_date_modified")?,
        }),
        EntityName::Attachments => EntityRow::Attachment(AttachmentRow {
            attachment_id: row.get("attachment_id")?,
            owner_id: row.get("owner_id")?,
            role: row.get("role")?,
            mime: row.get("mime")?,
            title: row.get("title")?,
            position: row.get("position")?,
            blob_id: row.get("blob_id")?,
            is_protected: row.get("is_protected")?,
            is_deleted: row.get("is_deleted")?,
            date_modified: row.get("date_modified")?,
            utc_date_modified: row.get("utc_date_modified")?,
            utc_date_scheduled_for_erasure_since: row
                .get("utc_date_scheduled_for_erasure_since")?,
        }),
        EntityName::Blobs => EntityRow::Blob(BlobRow {
            blob_id: row.get("blob_id")?,
            content: row.get("content")?,
            content_length: row.get("content_length")?,
            date_modified: row.get("date_modified")?,
            utc_date_modified: row.get("utc_date_modified")?,
        }),
        EntityName::Options => EntityRow::Option(OptionRow {
            name: row.get("name")?,
            value: row.get("value")?,
            is_synced: row.get("is_synced")?,
            utc_date_modified: row.get("utc_date_modified")?,
        }),
    };
    Ok((ordinal, entity_row))
}

pub(crate) const CHANGE_COLUMNS: &str =
    "id, entity_name, entity_id, hash, is_erased, change_id, instance_id, is_synced, utc_date_changed";

pub(crate) fn read_change(row: &Row<'_>) -> rusqlite::Result<EntityChange> {
    Ok(EntityChange {
        id: row.get("id")?,
        entity_name: parse(row, "entity_name")?,
        entity_id: row.get("entity_id")?,
        hash: row.get("hash")?,
        is_erased: row.get("is_erased")?,
        change_id: row.get("change_id")?,
        instance_id: row.get("instance_id")?,
        is_synced: row.get("is_synced")?,
        utc_date_changed: row.get("utc_date_changed")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_table_has_one_value_per_column() {
        let note = EntityRow::Option(OptionRow {
            name: "theme".into(),
            value: "dark".into(),
            is_synced: true,
            utc_date_modified: "2024-01-01 00:00:00.000Z".into(),
        });
        assert_eq!(row_values(&note).len(), spec(EntityName::Options).columns.len());
    }

    #[test]
    fn test_upsert_keeps_key_out_of_update_clause() {
        let sql = spec(EntityName::Branches).upsert();
        assert!(sql.contains("ON CONFLICT(branch_id) DO UPDATE SET note_id = excluded.note_id"));
        assert!(!sql.contains("branch_id = excluded.branch_id"));
    }

    #[test]
    fn test_scan_without_soft_delete_has_no_deleted_filter() {
        let (sql, param) = spec(EntityName::Revisions).scan(&ScanFilter::OwnedBy("n1".into()));
        assert!(sql.contains("1 = 1 AND note_id = ?1"));
        assert_eq!(param.as_deref(), Some("n1"));
    }
}
