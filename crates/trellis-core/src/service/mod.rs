//! Mutation façade
//!
//! [`NoteService`] is the only writer of notes, branches, attributes, revisions,
//! attachments, blobs and options. Every operation follows the same protocol under one
//! mutation lock:
//!
//! 1. validate against the current snapshot (nothing is written on failure)
//! 2. one store transaction writing the rows and one change entry per row
//! 3. one snapshot swap patching the cache
//! 4. broadcast of the committed change entries

mod attachments;
mod attributes;
mod branches;
mod notes;
mod params;
mod purge;
mod session;
mod sync;

pub use params::{
    AttributeUpdate, BranchUpdate, NewAttachment, NewAttribute, NewBranch, NewNote, NoteUpdate,
};
pub use purge::PurgeReport;
pub use sync::{ApplyOutcome, Conflict, ConflictResolution, RemoteChange};

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;
use trellis_config::TrellisConfig;

use crate::becca::{Becca, BeccaSnapshot, BeccaStats};
use crate::changes::ChangeTracker;
use crate::entities::{BlobRow, EntityChange, EntityName, EntityRow};
use crate::error::{TrellisError, TrellisResult};
use crate::hashing::blob_id_for;
use crate::protected::{crypto, EncryptionGate, SessionToken};
use crate::store::RowStore;
use crate::utils::{local_now, utc_now};

/// Rows and erasures of one façade call
#[derive(Debug, Default)]
struct WriteSet {
    rows: Vec<EntityRow>,
    erasures: Vec<(EntityName, String)>,
}

impl WriteSet {
    fn put(&mut self, row: EntityRow) {
        self.rows.push(row);
    }

    fn erase(&mut self, entity: EntityName, id: impl Into<String>) {
        self.erasures.push((entity, id.into()));
    }

    fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.erasures.is_empty()
    }
}

pub struct NoteService<S: RowStore> {
    store: Arc<S>,
    becca: Arc<Becca>,
    gate: EncryptionGate,
    tracker: ChangeTracker,
    write_lock: Mutex<()>,
    load_batch_size: usize,
}

impl<S: RowStore> NoteService<S> {
    /// A service whose cache is not loaded yet
    pub fn new(store: Arc<S>, config: &TrellisConfig) -> Self {
        Self {
            store,
            becca: Arc::new(Becca::new()),
            gate: EncryptionGate::new(&config.protected_session),
            tracker: ChangeTracker::new(
                config.sync.instance_id.clone(),
                config.cache.change_channel_capacity,
            ),
            write_lock: Mutex::new(()),
            load_batch_size: config.cache.load_batch_size,
        }
    }

    /// Create the service and load the cache
    pub fn open(store: Arc<S>, config: &TrellisConfig) -> TrellisResult<Self> {
        let service = Self::new(store, config);
        service.load()?;
        Ok(service)
    }

    /// Create the service and load the cache in batches, yielding between them
    pub async fn open_incremental(store: Arc<S>, config: &TrellisConfig) -> TrellisResult<Self> {
        let service = Self::new(store, config);
        service
            .becca
            .load_incremental(service.store.as_ref(), service.load_batch_size, None)
            .await?;
        Ok(service)
    }

    /// (Re)build the cache from the store
    pub fn load(&self) -> TrellisResult<BeccaStats> {
        let _guard = self.write_lock.lock();
        let token = self.gate.token();
        self.becca.load(self.store.as_ref(), token.as_ref())
    }

    pub fn becca(&self) -> &Arc<Becca> {
        &self.becca
    }

    /// Current graph snapshot
    pub fn snapshot(&self) -> TrellisResult<Arc<BeccaSnapshot>> {
        self.becca.snapshot()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn gate(&self) -> &EncryptionGate {
        &self.gate
    }

    pub fn instance_id(&self) -> &str {
        self.tracker.instance_id()
    }

    /// In-process feed of committed changes
    pub fn subscribe(&self) -> broadcast::Receiver<EntityChange> {
        self.tracker.subscribe()
    }

    /// Change entries after `cursor`, ascending
    pub fn changes_since(&self, cursor: i64, limit: usize) -> TrellisResult<Vec<EntityChange>> {
        Ok(self.store.changes_since(cursor, limit)?)
    }

    pub fn latest_change(
        &self,
        entity: EntityName,
        entity_id: &str,
    ) -> TrellisResult<Option<EntityChange>> {
        Ok(self.store.latest_change(entity, entity_id)?)
    }

    /// Sync cursor bookkeeping: everything up to `up_to` reached the peer
    pub fn mark_synced(&self, up_to: i64) -> TrellisResult<usize> {
        Ok(self.store.mark_changes_synced(up_to)?)
    }

    /// Validate and plan under the mutation lock, then commit the plan
    fn mutate<T>(
        &self,
        plan: impl FnOnce(&BeccaSnapshot, &mut WriteSet) -> TrellisResult<T>,
    ) -> TrellisResult<T> {
        let _guard = self.write_lock.lock();
        let snapshot = self.becca.snapshot()?;
        let mut writes = WriteSet::default();
        let out = plan(&snapshot, &mut writes)?;
        self.commit(writes)?;
        Ok(out)
    }

    /// Write rows and change entries in one transaction, then patch the cache and
    /// broadcast. Callers hold the mutation lock.
    fn commit(&self, writes: WriteSet) -> TrellisResult<Vec<EntityChange>> {
        if writes.is_empty() {
            return Ok(Vec::new());
        }

        let changes = self.store.transaction(|tx| {
            let mut changes = Vec::with_capacity(writes.rows.len() + writes.erasures.len());
            for row in &writes.rows {
                if let EntityRow::Blob(blob) = row {
                    if tx.get(EntityName::Blobs, &blob.blob_id)?.is_some() {
                        continue;
                    }
                }
                tx.put(row)?;
                changes.push(self.tracker.record(tx, row)?);
            }
            for (entity, id) in &writes.erasures {
                if tx.erase(*entity, id)? {
                    changes.push(self.tracker.record_erasure(tx, *entity, id)?);
                }
            }
            Ok::<_, TrellisError>(changes)
        })?;

        let token = self.gate.token();
        self.becca.update(|snapshot| {
            for row in writes.rows {
                snapshot.apply_row(row, token.as_ref());
            }
            for (entity, id) in &writes.erasures {
                snapshot.remove_entity(*entity, id);
            }
        })?;

        debug!(changes = changes.len(), "Mutation committed");
        self.tracker.publish(&changes);
        Ok(changes)
    }

    fn read_blob(&self, blob_id: &str) -> TrellisResult<BlobRow> {
        match self.store.get(EntityName::Blobs, blob_id)? {
            Some(EntityRow::Blob(blob)) => Ok(blob),
            _ => Err(TrellisError::not_found(EntityName::Blobs, blob_id)),
        }
    }

    /// Stored bytes of a blob, decrypted when the owner is protected
    fn read_content(
        &self,
        blob_id: &str,
        is_protected: bool,
        token: Option<&SessionToken>,
    ) -> TrellisResult<Vec<u8>> {
        let blob = self.read_blob(blob_id)?;
        if is_protected {
            decrypt_content(live_token(token)?, &blob.content)
        } else {
            Ok(blob.content)
        }
    }
}

/// Blob row for content as stored
fn blob_row(content: Vec<u8>) -> BlobRow {
    BlobRow {
        blob_id: blob_id_for(&content),
        content_length: content.len() as i64,
        content,
        date_modified: local_now(),
        utc_date_modified: utc_now(),
    }
}

fn live_token(token: Option<&SessionToken>) -> TrellisResult<&SessionToken> {
    match token {
        Some(token) if token.is_alive() => Ok(token),
        Some(_) => Err(TrellisError::Locked),
        None => Err(TrellisError::SessionRequired),
    }
}

fn encrypt_content(token: &SessionToken, content: &[u8]) -> TrellisResult<Vec<u8>> {
    token
        .with_key(|key| crypto::encrypt(key, content))
        .map(String::into_bytes)
}

fn decrypt_content(token: &SessionToken, stored: &[u8]) -> TrellisResult<Vec<u8>> {
    let payload = std::str::from_utf8(stored).map_err(|_| TrellisError::DecryptionFailed)?;
    token.with_key(|key| crypto::decrypt(key, payload))
}

/// Content bytes as they go to the blob store
fn content_at_rest(
    content: &[u8],
    is_protected: bool,
    token: Option<&SessionToken>,
) -> TrellisResult<Vec<u8>> {
    if is_protected {
        encrypt_content(live_token(token)?, content)
    } else {
        Ok(content.to_vec())
    }
}

/// Title as it goes to the row
fn title_at_rest(
    title: &str,
    is_protected: bool,
    token: Option<&SessionToken>,
) -> TrellisResult<String> {
    if is_protected {
        let token = live_token(token)?;
        token.with_key(|key| crypto::encrypt(key, title.as_bytes()))
    } else {
        Ok(title.to_string())
    }
}

/// Position after the largest of `positions`, 10 for the first
fn next_position(positions: impl Iterator<Item = i64>) -> i64 {
    positions.max().map_or(10, |max| max + 10)
}
