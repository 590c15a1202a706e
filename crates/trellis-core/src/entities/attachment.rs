use super::rows::AttachmentRow;
use crate::protected::{Protected, SessionToken};

/// Cached attachment, owned by a note or a revision
#[derive(Debug, Clone)]
pub struct Attachment {
    pub attachment_id: String,
    pub owner_id: String,
    pub role: String,
    pub mime: String,
    pub title: Protected<String>,
    pub position: i64,
    pub blob_id: String,
    pub date_modified: String,
    pub utc_date_modified: String,
    pub utc_date_scheduled_for_erasure_since: Option<String>,
}

impl Attachment {
    pub fn from_row(row: AttachmentRow) -> Self {
        Self {
            title: Protected::from_at_rest(row.title, row.is_protected),
            attachment_id: row.attachment_id,
            owner_id: row.owner_id,
            role: row.role,
            mime: row.mime,
            position: row.position,
            blob_id: row.blob_id,
            date_modified: row.date_modified,
            utc_date_modified: row.utc_date_modified,
            utc_date_scheduled_for_erasure_since: row.utc_date_scheduled_for_erasure_since,
        }
    }

    pub fn to_row(&self) -> AttachmentRow {
        AttachmentRow {
            attachment_id: self.attachment_id.clone(),
            owner_id: self.owner_id.clone(),
            role: self.role.clone(),
            mime: self.mime.clone(),
            title: self.title.at_rest(),
            position: self.position,
            blob_id: self.blob_id.clone(),
            is_protected: self.is_protected(),
            is_deleted: false,
            date_modified: self.date_modified.clone(),
            utc_date_modified: self.utc_date_modified.clone(),
            utc_date_scheduled_for_erasure_since: self
                .utc_date_scheduled_for_erasure_since
                .clone(),
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
