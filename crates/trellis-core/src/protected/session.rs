use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use super::crypto::SecretKey;
use crate::error::{TrellisError, TrellisResult};

/// The open protected session. Owned by the gate; dropping it zeroises the data key.
pub(crate) struct ActiveSession {
    pub(crate) id: u64,
    data_key: SecretKey,
    last_activity: Mutex<Instant>,
}

impl ActiveSession {
    pub(crate) fn new(id: u64, data_key: SecretKey) -> Self {
        Self {
            id,
            data_key,
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub(crate) fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub(crate) fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    pub(crate) fn data_key(&self) -> &[u8] {
        &self.data_key[..]
    }
}

/// Proof of a live protected session
///
/// Tokens are weak: when the session ends (logout or idle timeout) every token handed
/// out for it stops working, and protected values revealed under it read as locked.
#[derive(Clone)]
pub struct SessionToken {
    session: Weak<ActiveSession>,
}

impl SessionToken {
    pub(crate) fn new(session: &Arc<ActiveSession>) -> Self {
        Self {
            session: Arc::downgrade(session),
        }
    }

    /// Whether the session this token was issued for is still open
    pub fn is_alive(&self) -> bool {
        self.session.strong_count() > 0
    }

    pub(crate) fn session_id(&self) -> Option<u64> {
        self.session.upgrade().map(|s| s.id)
    }

    /// Record activity on the session, if it is still open
    pub(crate) fn touch(&self) {
        if let Some(session) = self.session.upgrade() {
            session.touch();
        }
    }

    /// Run `f` with the data key, counting as session activity
    pub(crate) fn with_key<R>(&self, f: impl FnOnce(&[u8]) -> TrellisResult<R>) -> TrellisResult<R> {
        let session = self.session.upgrade().ok_or(TrellisError::Locked)?;
        session.touch();
        f(session.data_key())
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("alive", &self.is_alive())
            .finish()
    }
}
