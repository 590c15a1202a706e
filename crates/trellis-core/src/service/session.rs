use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{blob_row, content_at_rest, decrypt_content, live_token, NoteService, WriteSet};
use crate::becca::BeccaSnapshot;
use crate::entities::{BlobRow, EntityName, EntityRow};
use crate::error::{StructuralViolation, TrellisError, TrellisResult};
use crate::protected::{crypto, KeyMaterial, Protected, SessionToken};
use crate::store::RowStore;
use crate::utils::{local_now, utc_now, ROOT_NOTE_ID};

/// Plaintext of a title, whether or not the cache holds it unsealed
fn plain_title(title: &Protected<String>, token: &SessionToken) -> TrellisResult<String> {
    match title {
        Protected::Open(value) => Ok(value.clone()),
        Protected::Sealed { ciphertext, .. } => match title.reveal(token) {
            Ok(value) => Ok(value.clone()),
            Err(_) => token.with_key(|key| crypto::decrypt_string(key, ciphertext)),
        },
    }
}

fn key_material(snapshot: &BeccaSnapshot) -> Option<KeyMaterial> {
    KeyMaterial::from_options(|name| snapshot.option_value(name).map(str::to_string))
}

impl<S: RowStore> NoteService<S> {
    pub fn is_protection_initialized(&self) -> TrellisResult<bool> {
        Ok(key_material(&*self.snapshot()?).is_some())
    }

    /// Set up protected sessions for this database with a first secret
    pub fn initialize_protection(&self, secret: &str) -> TrellisResult<()> {
        self.mutate(|snapshot, writes| {
            if key_material(snapshot).is_some() {
                return Err(StructuralViolation::invalid(
                    "secret",
                    "protection is already initialized; change the secret instead",
                )
                .into());
            }
            let material = self.gate.create_key_material(secret)?;
            put_material(writes, &material);
            info!("Protected sessions initialized");
            Ok(())
        })
    }

    /// Re-wrap the data key under a new secret. Protected content is not re-encrypted
    /// and an open session stays open.
    pub fn change_secret(&self, old_secret: &str, new_secret: &str) -> TrellisResult<()> {
        self.mutate(|snapshot, writes| {
            let material = key_material(snapshot).ok_or(TrellisError::ProtectionNotInitialized)?;
            let rewrapped = self
                .gate
                .rewrap_key_material(&material, old_secret, new_secret)?;
            put_material(writes, &rewrapped);
            info!("Protected session secret changed");
            Ok(())
        })
    }

    /// Verify the secret, open a session and decrypt protected titles in the cache
    pub fn start_protected_session(&self, secret: &str) -> TrellisResult<SessionToken> {
        let material =
            key_material(&*self.becca.snapshot()?).ok_or(TrellisError::ProtectionNotInitialized)?;
        // Key derivation runs outside the mutation lock
        let token = self.gate.start_session(&material, secret)?;
        let _guard = self.write_lock.lock();
        let unsealed = self.becca.unseal_all(&token)?;
        debug!(unsealed, "Unsealed protected titles");
        Ok(token)
    }

    /// Close the session and scrub every decrypted title from the cache
    pub fn end_protected_session(&self) -> bool {
        let _guard = self.write_lock.lock();
        let ended = self.gate.end_session();
        let scrubbed = self.becca.scrub_all();
        if ended {
            debug!(scrubbed, "Scrubbed protected titles");
        }
        ended
    }

    pub fn is_session_active(&self) -> bool {
        self.gate.is_active()
    }

    /// End the session if it has been idle for the configured timeout
    pub fn lock_if_expired(&self) -> bool {
        if !self.gate.is_expired() {
            return false;
        }
        info!("Protected session expired");
        self.end_protected_session()
    }

    /// Protect or unprotect a note, optionally with its whole subtree. Titles and
    /// contents of the notes, their revisions and the attachments of both are
    /// re-encrypted or decrypted. Returns the number of notes changed.
    pub fn set_protected(
        &self,
        note_id: &str,
        protect: bool,
        token: &SessionToken,
        include_subtree: bool,
    ) -> TrellisResult<usize> {
        let token = live_token(Some(token))?;
        self.mutate(|snapshot, writes| {
            if note_id == ROOT_NOTE_ID {
                return Err(StructuralViolation::RootViolation(
                    "the root note cannot be protected".into(),
                )
                .into());
            }
            if !snapshot.has_note(note_id) {
                return Err(TrellisError::not_found(EntityName::Notes, note_id));
            }
            let note_ids = if include_subtree {
                snapshot.subtree_note_ids(note_id)
            } else {
                vec![note_id.to_string()]
            };

            let mut changed = 0;
            for id in note_ids {
                let Some(note) = snapshot.note(&id) else {
                    continue;
                };
                if note.is_protected() != protect {
                    let (title, blob) =
                        self.reprotect(&note.title, &note.blob_id, protect, token)?;
                    let mut row = note.to_row();
                    row.title = title;
                    row.is_protected = protect;
                    row.blob_id = blob.blob_id.clone();
                    row.date_modified = local_now();
                    row.utc_date_modified = utc_now();
                    writes.put(EntityRow::Blob(blob));
                    writes.put(EntityRow::Note(row));
                    changed += 1;
                }
                self.reprotect_attachments(snapshot, &id, protect, token, writes)?;

                for revision in snapshot.revisions_of(&id) {
                    if revision.is_protected() != protect {
                        let (title, blob) =
                            self.reprotect(&revision.title, &revision.blob_id, protect, token)?;
                        let mut row = revision.to_row();
                        row.title = title;
                        row.is_protected = protect;
                        row.blob_id = blob.blob_id.clone();
                        row.utc_date_modified = utc_now();
                        writes.put(EntityRow::Blob(blob));
                        writes.put(EntityRow::Revision(row));
                    }
                    self.reprotect_attachments(
                        snapshot,
                        &revision.revision_id,
                        protect,
                        token,
                        writes,
                    )?;
                }
            }
            debug!(note_id, protect, changed, "Changed note protection");
            Ok(changed)
        })
    }

    fn reprotect_attachments(
        &self,
        snapshot: &BeccaSnapshot,
        owner_id: &str,
        protect: bool,
        token: &SessionToken,
        writes: &mut WriteSet,
    ) -> TrellisResult<()> {
        for attachment in snapshot.attachments_of(owner_id) {
            if attachment.is_protected() == protect {
                continue;
            }
            let (title, blob) =
                self.reprotect(&attachment.title, &attachment.blob_id, protect, token)?;
            let mut row = attachment.to_row();
            row.title = title;
            row.is_protected = protect;
            row.blob_id = blob.blob_id.clone();
            row.utc_date_modified = utc_now();
            writes.put(EntityRow::Blob(blob));
            writes.put(EntityRow::Attachment(row));
        }
        Ok(())
    }

    /// At-rest title and content blob of an entity after flipping its protection
    fn reprotect(
        &self,
        title: &Protected<String>,
        blob_id: &str,
        protect: bool,
        token: &SessionToken,
    ) -> TrellisResult<(String, BlobRow)> {
        let stored = self.read_blob(blob_id)?.content;
        let content = if title.is_protected() {
            decrypt_content(token, &stored)?
        } else {
            stored
        };
        let blob = blob_row(content_at_rest(&content, protect, Some(token))?);
        let title = plain_title(title, token)?;
        let title = if protect {
            Protected::seal_with(token, title)?.at_rest()
        } else {
            title
        };
        Ok((title, blob))
    }

    /// Background task ending the session once it idles past the timeout. Stops when
    /// the service is dropped.
    pub fn spawn_session_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let service: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(service) = service.upgrade() else {
                    debug!("Session reaper stopping");
                    break;
                };
                service.lock_if_expired();
            }
        })
    }
}

fn put_material(writes: &mut WriteSet, material: &KeyMaterial) {
    let now = utc_now();
    for row in material.to_option_rows(&now) {
        writes.put(EntityRow::Option(row));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protected::LOCKED_PLACEHOLDER;
    use crate::service::{NewAttachment, NewNote, NoteUpdate};
    use crate::test_support::service;
    use trellis_config::TrellisConfig;

    fn protected_service() -> NoteService<crate::store::MemoryRowStore> {
        let service = service();
        service.initialize_protection("correct horse").unwrap();
        service
    }

    #[test]
    fn test_protected_title_locks_after_session_ends() {
        let service = protected_service();
        let token = service.start_protected_session("correct horse").unwrap();
        let (note, _) = service
            .create_note(
                NewNote::new("root", "Secret").with_content("plans").protected(),
                Some(&token),
            )
            .unwrap();
        assert_eq!(note.title(&token).unwrap(), "Secret");
        assert_eq!(service.note_content(&note.note_id, Some(&token)).unwrap(), b"plans");

        assert!(service.end_protected_session());
        let note = service.becca().note(&note.note_id).unwrap().unwrap();
        assert!(note.is_locked());
        assert_eq!(note.display_title(Some(&token)), LOCKED_PLACEHOLDER);
        assert!(matches!(note.title(&token), Err(TrellisError::Locked)));
        assert!(matches!(
            service.note_content(&note.note_id, Some(&token)),
            Err(TrellisError::Locked)
        ));
        assert!(matches!(
            service.note_content(&note.note_id, None),
            Err(TrellisError::SessionRequired)
        ));
    }

    #[test]
    fn test_new_session_unseals_cached_titles() {
        let service = protected_service();
        let token = service.start_protected_session("correct horse").unwrap();
        let (note, _) = service
            .create_note(NewNote::new("root", "Secret").protected(), Some(&token))
            .unwrap();
        service.end_protected_session();

        let token = service.start_protected_session("correct horse").unwrap();
        let note = service.becca().note(&note.note_id).unwrap().unwrap();
        assert_eq!(note.title(&token).unwrap(), "Secret");
    }

    #[test]
    fn test_wrong_secret_fails_without_session() {
        let service = protected_service();
        assert!(matches!(
            service.start_protected_session("battery staple"),
            Err(TrellisError::AuthenticationFailed)
        ));
        assert!(!service.is_session_active());
    }

    #[test]
    fn test_session_needs_initialized_protection() {
        let service = service();
        assert!(matches!(
            service.start_protected_session("x"),
            Err(TrellisError::ProtectionNotInitialized)
        ));
        assert!(matches!(
            service.create_note(NewNote::new("root", "S").protected(), None),
            Err(TrellisError::SessionRequired)
        ));
    }

    #[test]
    fn test_protected_parent_protects_children() {
        let service = protected_service();
        let token = service.start_protected_session("correct horse").unwrap();
        let (parent, _) = service
            .create_note(NewNote::new("root", "Vault").protected(), Some(&token))
            .unwrap();
        let (child, _) = service
            .create_note(NewNote::new(parent.note_id.as_str(), "Inner"), Some(&token))
            .unwrap();
        assert!(child.is_protected());
    }

    #[test]
    fn test_set_protected_round_trip_with_subtree() {
        let service = protected_service();
        let token = service.start_protected_session("correct horse").unwrap();
        let (parent, _) = service
            .create_note(NewNote::new("root", "Diary").with_content("day 1"), None)
            .unwrap();
        let (child, _) = service
            .create_note(
                NewNote::new(parent.note_id.as_str(), "Entry").with_content("day 2"),
                None,
            )
            .unwrap();
        service
            .create_attachment(
                NewAttachment::new(&child.note_id, "file", "text/plain", "scan.txt", b"scan".to_vec()),
                None,
            )
            .unwrap();

        assert_eq!(service.set_protected(&parent.note_id, true, &token, true).unwrap(), 2);
        let snapshot = service.snapshot().unwrap();
        let child_note = snapshot.note(&child.note_id).unwrap();
        assert!(child_note.is_protected());
        assert_eq!(child_note.title(&token).unwrap(), "Entry");
        let attachment = snapshot.attachments_of(&child.note_id).pop().unwrap();
        assert!(attachment.is_protected());
        assert_eq!(
            service
                .attachment_content(&attachment.attachment_id, Some(&token))
                .unwrap(),
            b"scan"
        );

        service.set_protected(&parent.note_id, false, &token, true).unwrap();
        service.end_protected_session();
        assert_eq!(service.note_content(&child.note_id, None).unwrap(), b"day 2");
        assert_eq!(
            service.becca().note(&child.note_id).unwrap().unwrap().display_title(None),
            "Entry"
        );
    }

    #[test]
    fn test_protecting_note_protects_its_revisions() {
        let service = protected_service();
        let token = service.start_protected_session("correct horse").unwrap();
        let (diary, _) = service
            .create_note(
                NewNote::new("root", "Diary secret").with_content("my secret body"),
                None,
            )
            .unwrap();
        let revision = service.create_revision(&diary.note_id).unwrap();
        service
            .create_attachment(
                NewAttachment::new(
                    &revision.revision_id,
                    "image",
                    "image/png",
                    "photo.png",
                    b"pixels".to_vec(),
                ),
                None,
            )
            .unwrap();

        assert_eq!(service.set_protected(&diary.note_id, true, &token, false).unwrap(), 1);
        service.end_protected_session();

        let row = match service
            .store()
            .get(EntityName::Revisions, &revision.revision_id)
            .unwrap()
        {
            Some(EntityRow::Revision(row)) => row,
            other => panic!("expected a revision row, got {:?}", other),
        };
        assert!(row.is_protected);
        assert_ne!(row.title, "Diary secret");
        assert!(matches!(
            service.revision_content(&revision.revision_id, None),
            Err(TrellisError::SessionRequired)
        ));
        let attachment = service
            .snapshot()
            .unwrap()
            .attachments_of(&revision.revision_id)
            .pop()
            .unwrap();
        assert!(attachment.is_protected());

        let token = service.start_protected_session("correct horse").unwrap();
        assert_eq!(
            service
                .revision_content(&revision.revision_id, Some(&token))
                .unwrap(),
            b"my secret body"
        );
        assert_eq!(
            service
                .attachment_content(&attachment.attachment_id, Some(&token))
                .unwrap(),
            b"pixels"
        );
    }

    #[test]
    fn test_root_cannot_be_protected() {
        let service = protected_service();
        assert!(service.is_protection_initialized().unwrap());
        let token = service.start_protected_session("correct horse").unwrap();
        assert!(matches!(
            service.set_protected(ROOT_NOTE_ID, true, &token, true),
            Err(TrellisError::Structural(StructuralViolation::RootViolation(_)))
        ));
        assert!(!service.snapshot().unwrap().note(ROOT_NOTE_ID).unwrap().is_protected());
    }

    #[test]
    fn test_secret_check_does_not_wait_for_writers() {
        let service = Arc::new(protected_service());
        let guard = service.write_lock.lock();
        let (tx, rx) = std::sync::mpsc::channel();
        let worker = Arc::clone(&service);
        std::thread::spawn(move || {
            let _ = tx.send(worker.start_protected_session("battery staple"));
        });

        let outcome = rx.recv_timeout(Duration::from_secs(30)).unwrap();
        assert!(matches!(outcome, Err(TrellisError::AuthenticationFailed)));
        drop(guard);
    }

    #[test]
    fn test_change_secret_keeps_content_readable() {
        let service = protected_service();
        let token = service.start_protected_session("correct horse").unwrap();
        let (note, _) = service
            .create_note(NewNote::new("root", "S").with_content("x").protected(), Some(&token))
            .unwrap();
        service.change_secret("correct horse", "new secret").unwrap();
        service.end_protected_session();

        assert!(matches!(
            service.start_protected_session("correct horse"),
            Err(TrellisError::AuthenticationFailed)
        ));
        let token = service.start_protected_session("new secret").unwrap();
        assert_eq!(service.note_content(&note.note_id, Some(&token)).unwrap(), b"x");
    }

    #[test]
    fn test_protected_title_update_needs_session() {
        let service = protected_service();
        let token = service.start_protected_session("correct horse").unwrap();
        let (note, _) = service
            .create_note(NewNote::new("root", "S").protected(), Some(&token))
            .unwrap();
        service.end_protected_session();

        let update = NoteUpdate {
            title: Some("renamed".into()),
            ..NoteUpdate::default()
        };
        assert!(matches!(
            service.update_note(&note.note_id, update, None),
            Err(TrellisError::SessionRequired)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_ends_idle_session() {
        let mut config = TrellisConfig::for_testing();
        config.protected_session.timeout_secs = 0;
        let service = Arc::new(
            NoteService::open(Arc::new(crate::store::MemoryRowStore::new()), &config).unwrap(),
        );
        service.ensure_root().unwrap();
        service.initialize_protection("pw").unwrap();
        let token = service.start_protected_session("pw").unwrap();

        let reaper = service.spawn_session_reaper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!service.is_session_active());
        assert!(!token.is_alive());
        reaper.abort();
    }
}
