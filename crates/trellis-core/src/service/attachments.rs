use std::sync::Arc;

use super::{blob_row, content_at_rest, next_position, title_at_rest, NewAttachment, NoteService};
use crate::entities::{Attachment, AttachmentRow, EntityName, EntityRow};
use crate::error::{StructuralViolation, TrellisError, TrellisResult};
use crate::protected::SessionToken;
use crate::store::RowStore;
use crate::utils::{local_now, new_entity_id, utc_now};

impl<S: RowStore> NoteService<S> {
    /// Attach content to a note or revision. Attachments of protected owners are
    /// protected.
    pub fn create_attachment(
        &self,
        new: NewAttachment,
        token: Option<&SessionToken>,
    ) -> TrellisResult<Arc<Attachment>> {
        let attachment_id = self.mutate(|snapshot, writes| {
            let is_protected = match (snapshot.note(&new.owner_id), snapshot.revision(&new.owner_id)) {
                (Some(note), _) => note.is_protected(),
                (None, Some(revision)) => revision.is_protected(),
                (None, None) => {
                    return Err(StructuralViolation::MissingNote(new.owner_id.clone()).into())
                }
            };
            if new.role.is_empty() {
                return Err(StructuralViolation::invalid("attachment role", "must not be empty").into());
            }

            let blob = blob_row(content_at_rest(&new.content, is_protected, token)?);
            let attachment = AttachmentRow {
                attachment_id: new_entity_id(),
                owner_id: new.owner_id.clone(),
                role: new.role.clone(),
                mime: new.mime.clone(),
                title: title_at_rest(&new.title, is_protected, token)?,
                position: new.position.unwrap_or_else(|| {
                    next_position(
                        snapshot
                            .attachments_of(&new.owner_id)
                            .iter()
                            .map(|a| a.position),
                    )
                }),
                blob_id: blob.blob_id.clone(),
                is_protected,
                is_deleted: false,
                date_modified: local_now(),
                utc_date_modified: utc_now(),
                utc_date_scheduled_for_erasure_since: None,
            };
            let attachment_id = attachment.attachment_id.clone();
            writes.put(EntityRow::Blob(blob));
            writes.put(EntityRow::Attachment(attachment));
            Ok(attachment_id)
        })?;
        self.snapshot()?
            .attachment(&attachment_id)
            .ok_or_else(|| TrellisError::not_found(EntityName::Attachments, &attachment_id))
    }

    pub fn attachment_content(
        &self,
        attachment_id: &str,
        token: Option<&SessionToken>,
    ) -> TrellisResult<Vec<u8>> {
        let attachment = self
            .snapshot()?
            .attachment(attachment_id)
            .ok_or_else(|| TrellisError::not_found(EntityName::Attachments, attachment_id))?;
        self.read_content(&attachment.blob_id, attachment.is_protected(), token)
    }

    pub fn delete_attachment(&self, attachment_id: &str) -> TrellisResult<()> {
        self.mutate(|snapshot, writes| {
            let attachment = snapshot
                .attachment(attachment_id)
                .ok_or_else(|| TrellisError::not_found(EntityName::Attachments, attachment_id))?;
            let mut row = attachment.to_row();
            row.is_deleted = true;
            if row.is_protected {
                row.title.clear();
            }
            row.utc_date_modified = utc_now();
            writes.put(EntityRow::Attachment(row));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::NewNote;
    use crate::test_support::service;

    #[test]
    fn test_attachment_lifecycle() {
        let service = service();
        let (note, _) = service.create_note(NewNote::new("root", "A"), None).unwrap();
        let attachment = service
            .create_attachment(
                NewAttachment::new(&note.note_id, "image", "image/png", "diagram.png", b"png".to_vec()),
                None,
            )
            .unwrap();

        assert_eq!(attachment.position, 10);
        assert_eq!(
            service
                .attachment_content(&attachment.attachment_id, None)
                .unwrap(),
            b"png"
        );
        assert_eq!(service.snapshot().unwrap().attachments_of(&note.note_id).len(), 1);

        service.delete_attachment(&attachment.attachment_id).unwrap();
        assert!(service
            .snapshot()
            .unwrap()
            .attachment(&attachment.attachment_id)
            .is_none());
    }

    #[test]
    fn test_attachment_owner_must_exist() {
        let service = service();
        let err = service
            .create_attachment(
                NewAttachment::new("ghost", "file", "text/plain", "a.txt", b"x".to_vec()),
                None,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            TrellisError::Structural(StructuralViolation::MissingNote(_))
        ));
    }
}
