use super::kinds::NoteType;
use super::rows::RevisionRow;
use crate::protected::{Protected, SessionToken};

/// Cached revision: an immutable snapshot of a note's title and content
#[derive(Debug, Clone)]
pub struct Revision {
    pub revision_id: String,
    pub note_id: String,
    pub note_type: NoteType,
    pub mime: String,
    pub title: Protected<String>,
    pub blob_id: String,
    pub date_last_edited: String,
    pub date_created: String,
    pub utc_date_last_edited: String,
    pub utc_date_created: String,
    pub utc_date_modified: String,
}

impl Revision {
    pub fn from_row(row: RevisionRow) -> Self {
        Self {
            title: Protected::from_at_rest(row.title, row.is_protected),
            revision_id: row.revision_id,
            note_id: row.note_id,
            note_type: row.note_type,
            mime: row.mime,
            blob_id: row.blob_id,
            date_last_edited: row.date_last_edited,
            date_created: row.date_created,
            utc_date_last_edited: row.utc_date_last_edited,
            utc_date_created: row.utc_date_created,
            utc_date_modified: row.utc_date_modified,
        }
    }

    pub fn to_row(&self) -> RevisionRow {
        RevisionRow {
            revision_id: self.revision_id.clone(),
            note_id: self.note_id.clone(),
            note_type: self.note_type,
            mime: self.mime.clone(),
            is_protected: self.is_protected(),
            title: self.title.at_rest(),
            blob_id: self.blob_id.clone(),
            date_last_edited: self.date_last_edited.clone(),
            date_created: self.date_created.clone(),
            utc_date_last_edited: self.utc_date_last_edited.clone(),
            utc_date_created: self.utc_date_created.clone(),
            utc_date_modified: self.utc_date_modified.clone(),
        }
    }

    pub fn is_protected(&self) -> bool {
        self.title.is_protected()
    }

    pub fn is_locked(&self) -> bool {
        self.title.is_locked()
    }

    pub fn display_title(&self, token: Option<&SessionToken>) -> &str {
        self.title.display(token)
    }
}
