use super::kinds::NoteType;
use super::rows::NoteRow;
use crate::error::TrellisResult;
use crate::protected::{Protected, SessionToken};
use crate::utils::ROOT_NOTE_ID;

/// Cached note. The title of a protected note stays ciphertext until a session unseals it.
#[derive(Debug, Clone)]
pub struct Note {
    pub note_id: String,
    pub title: Protected<String>,
    pub note_type: NoteType,
    pub mime: String,
    pub blob_id: String,
    pub date_created: String,
    pub date_modified: String,
    pub utc_date_created: String,
    pub utc_date_modified: String,
}

impl Note {
    pub fn from_row(row: NoteRow) -> Self {
        Self {
            title: Protected::from_at_rest(row.title, row.is_protected),
            note_id: row.note_id,
            note_type: row.note_type,
            mime: row.mime,
            blob_id: row.blob_id,
            date_created: row.date_created,
            date_modified: row.date_modified,
            utc_date_created: row.utc_date_created,
            utc_date_modified: row.utc_date_modified,
        }
    }

    /// At-rest row. Cached notes are never deleted.
    pub fn to_row(&self) -> NoteRow {
        NoteRow {
            note_id: self.note_id.clone(),
            title: self.title.at_rest(),
            note_type: self.note_type,
            mime: self.mime.clone(),
            is_protected: self.is_protected(),
            is_deleted: false,
            blob_id: self.blob_id.clone(),
            date_created: self.date_created.clone(),
            date_modified: self.date_modified.clone(),
            utc_date_created: self.utc_date_created.clone(),
            utc_date_modified: self.utc_date_modified.clone(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.note_id == ROOT_NOTE_ID
    }

    pub fn is_protected(&self) -> bool {
        self.title.is_protected()
    }

    /// Protected and not readable in the current cache
    pub fn is_locked(&self) -> bool {
        self.title.is_locked()
    }

    /// Title for display: plaintext when readable, otherwise the locked placeholder
    pub fn display_title(&self, token: Option<&SessionToken>) -> &str {
        self.title.display(token)
    }

    /// Title for a protected-aware reader. Fails with `Locked` for a sealed title.
    pub fn title(&self, token: &SessionToken) -> TrellisResult<&str> {
        self.title.reveal(token).map(String::as_str)
    }
}
