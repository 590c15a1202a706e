//! Two-layer protected values
//!
//! A field of a protected entity always keeps its at-rest ciphertext. While a session is
//! open the cache may also hold the plaintext, tagged with the id of the session that
//! decrypted it; reading requires a token for that same session. Scrubbing drops the
//! plaintext, which is zeroised.

use std::fmt;
use zeroize::{Zeroize, Zeroizing};

use super::{crypto, SessionToken};
use crate::error::{TrellisError, TrellisResult};

/// Title shown for protected entities outside a session
pub const LOCKED_PLACEHOLDER: &str = "[protected]";

/// A field that may be encrypted at rest
#[derive(Clone)]
pub enum Protected<T: Zeroize + Clone> {
    /// Unprotected entity; the value is readable by anyone
    Open(T),
    /// Protected entity
    Sealed {
        ciphertext: String,
        unsealed: Option<Unsealed<T>>,
    },
}

/// Plaintext decrypted under one specific session
#[derive(Clone)]
pub struct Unsealed<T: Zeroize + Clone> {
    session_id: u64,
    value: Zeroizing<T>,
}

impl<T: Zeroize + Clone> Protected<T> {
    pub fn open(value: T) -> Self {
        Protected::Open(value)
    }

    pub fn sealed(ciphertext: impl Into<String>) -> Self {
        Protected::Sealed {
            ciphertext: ciphertext.into(),
            unsealed: None,
        }
    }

    pub fn is_protected(&self) -> bool {
        matches!(self, Protected::Sealed { .. })
    }

    /// Protected and not decrypted in the cache
    pub fn is_locked(&self) -> bool {
        matches!(self, Protected::Sealed { unsealed: None, .. })
    }

    /// Value of an unprotected field. `None` for protected fields, even when unsealed.
    pub fn open_value(&self) -> Option<&T> {
        match self {
            Protected::Open(value) => Some(value),
            Protected::Sealed { .. } => None,
        }
    }

    /// At-rest ciphertext of a protected field
    pub fn ciphertext(&self) -> Option<&str> {
        match self {
            Protected::Open(_) => None,
            Protected::Sealed { ciphertext, .. } => Some(ciphertext),
        }
    }

    /// Read the value. Protected fields need a live token for the session that
    /// decrypted them; a successful read counts as session activity.
    pub fn reveal(&self, token: &SessionToken) -> TrellisResult<&T> {
        match self {
            Protected::Open(value) => Ok(value),
            Protected::Sealed { unsealed, .. } => {
                let session_id = token.session_id().ok_or(TrellisError::Locked)?;
                match unsealed {
                    Some(u) if u.session_id == session_id => {
                        token.touch();
                        Ok(&u.value)
                    }
                    _ => Err(TrellisError::Locked),
                }
            }
        }
    }

    pub(crate) fn unseal(&mut self, session_id: u64, value: T) {
        if let Protected::Sealed { unsealed, .. } = self {
            *unsealed = Some(Unsealed {
                session_id,
                value: Zeroizing::new(value),
            });
        }
    }

    /// Drop any plaintext. Returns whether something was scrubbed.
    pub(crate) fn scrub(&mut self) -> bool {
        match self {
            Protected::Sealed { unsealed, .. } => unsealed.take().is_some(),
            Protected::Open(_) => false,
        }
    }
}

impl Protected<String> {
    /// Build from an at-rest column
    pub fn from_at_rest(value: String, is_protected: bool) -> Self {
        if is_protected {
            Protected::sealed(value)
        } else {
            Protected::Open(value)
        }
    }

    /// Column value to write back to the store
    pub fn at_rest(&self) -> String {
        match self {
            Protected::Open(value) => value.clone(),
            Protected::Sealed { ciphertext, .. } => ciphertext.clone(),
        }
    }

    /// Encrypt `value` under the token's session. The result is already unsealed for
    /// that session.
    pub fn seal_with(token: &SessionToken, value: String) -> TrellisResult<Self> {
        let session_id = token.session_id().ok_or(TrellisError::Locked)?;
        let ciphertext = token.with_key(|key| crypto::encrypt(key, value.as_bytes()))?;
        let mut sealed = Protected::sealed(ciphertext);
        sealed.unseal(session_id, value);
        Ok(sealed)
    }

    /// Decrypt the at-rest ciphertext into the plaintext layer. Returns whether anything
    /// was decrypted.
    pub(crate) fn unseal_with(&mut self, token: &SessionToken) -> TrellisResult<bool> {
        let Protected::Sealed { ciphertext, .. } = self else {
            return Ok(false);
        };
        let session_id = token.session_id().ok_or(TrellisError::Locked)?;
        let plain = token.with_key(|key| crypto::decrypt_string(key, ciphertext))?;
        self.unseal(session_id, plain);
        Ok(true)
    }

    /// Plaintext when readable, otherwise [`LOCKED_PLACEHOLDER`]
    pub fn display<'a>(&'a self, token: Option<&SessionToken>) -> &'a str {
        match (self, token) {
            (Protected::Open(value), _) => value,
            (Protected::Sealed { .. }, Some(token)) => self
                .reveal(token)
                .map(String::as_str)
                .unwrap_or(LOCKED_PLACEHOLDER),
            (Protected::Sealed { .. }, None) => LOCKED_PLACEHOLDER,
        }
    }
}

impl<T: Zeroize + Clone + fmt::Debug> fmt::Debug for Protected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protected::Open(value) => f.debug_tuple("Open").field(value).finish(),
            Protected::Sealed { unsealed, .. } => f
                .debug_struct("Sealed")
                .field("unsealed", &unsealed.is_some())
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protected::crypto::random_key;
    use crate::protected::ActiveSession;
    use std::sync::Arc;

    fn session(id: u64) -> (Arc<ActiveSession>, SessionToken) {
        let session = Arc::new(ActiveSession::new(id, random_key()));
        let token = SessionToken::new(&session);
        (session, token)
    }

    #[test]
    fn test_open_value_needs_no_session() {
        let value = Protected::from_at_rest("Groceries".to_string(), false);
        assert_eq!(value.open_value().map(String::as_str), Some("Groceries"));
        assert_eq!(value.display(None), "Groceries");
        assert!(!value.is_locked());
    }

    #[test]
    fn test_sealed_value_is_locked_without_unseal() {
        let (_session, token) = session(1);
        let value = Protected::<String>::sealed("ciphertext");
        assert!(value.is_locked());
        assert!(matches!(value.reveal(&token), Err(TrellisError::Locked)));
        assert_eq!(value.display(Some(&token)), LOCKED_PLACEHOLDER);
        assert_eq!(value.at_rest(), "ciphertext");
    }

    #[test]
    fn test_unsealed_value_readable_only_by_same_session() {
        let (_s1, token1) = session(1);
        let (_s2, token2) = session(2);
        let mut value = Protected::<String>::sealed("ciphertext");
        value.unseal(1, "Secret".to_string());

        assert_eq!(value.reveal(&token1).unwrap(), "Secret");
        assert!(matches!(value.reveal(&token2), Err(TrellisError::Locked)));
    }

    #[test]
    fn test_reveal_counts_as_session_activity() {
        let (session, token) = session(4);
        let mut value = Protected::<String>::sealed("ciphertext");
        value.unseal(4, "Secret".to_string());

        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(session.idle_for() >= std::time::Duration::from_millis(50));
        value.reveal(&token).unwrap();
        assert!(session.idle_for() < std::time::Duration::from_millis(50));
    }

    #[test]
    fn test_dead_token_cannot_reveal() {
        let (session, token) = session(7);
        let mut value = Protected::<String>::sealed("ciphertext");
        value.unseal(7, "Secret".to_string());
        drop(session);

        assert!(!token.is_alive());
        assert!(matches!(value.reveal(&token), Err(TrellisError::Locked)));
    }

    #[test]
    fn test_scrub_drops_plaintext() {
        let (_session, token) = session(3);
        let mut value = Protected::<String>::sealed("ciphertext");
        value.unseal(3, "Secret".to_string());

        assert!(value.scrub());
        assert!(value.is_locked());
        assert!(value.reveal(&token).is_err());
        assert!(!value.scrub());
    }

    #[test]
    fn test_debug_never_prints_plaintext() {
        let mut value = Protected::<String>::sealed("ciphertext");
        value.unseal(1, "Secret".to_string());
        let printed = format!("{:?}", value);
        assert!(!printed.contains("Secret"));
        assert!(!printed.contains("ciphertext"));
    }

    #[test]
    fn test_seal_with_then_unseal_on_fresh_copy() {
        let (_session, token) = session(3);
        let sealed = Protected::seal_with(&token, "Diary".to_string()).unwrap();
        assert_eq!(sealed.reveal(&token).unwrap(), "Diary");

        let mut reloaded = Protected::from_at_rest(sealed.at_rest(), true);
        assert!(reloaded.is_locked());
        assert!(reloaded.unseal_with(&token).unwrap());
        assert_eq!(reloaded.display(Some(&token)), "Diary");
        assert!(reloaded.scrub());
        assert_eq!(reloaded.display(Some(&token)), LOCKED_PLACEHOLDER);
    }
}
