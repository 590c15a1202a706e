//! Encryption gate
//!
//! The only path to the data key. An installation stores four options: a random salt
//! and scrypt verification hash used to check the secret, a second salt for the
//! key-wrapping derivation, and the data key wrapped with the derived key.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use trellis_config::{KdfConfig, ProtectedSessionConfig};
use zeroize::Zeroizing;

use super::crypto::{self, SecretKey, KEY_LEN};
use super::{ActiveSession, SessionToken};
use crate::entities::OptionRow;
use crate::error::{TrellisError, TrellisResult};

pub const OPT_VERIFICATION_HASH: &str = "passwordVerificationHash";
pub const OPT_VERIFICATION_SALT: &str = "passwordVerificationSalt";
pub const OPT_DERIVED_KEY_SALT: &str = "passwordDerivedKeySalt";
pub const OPT_ENCRYPTED_DATA_KEY: &str = "encryptedDataKey";

/// Persisted secret-verification and key-wrapping material, all base64
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    verification_hash: String,
    verification_salt: String,
    derived_key_salt: String,
    encrypted_data_key: String,
}

impl KeyMaterial {
    pub const OPTION_NAMES: [&'static str; 4] = [
        OPT_VERIFICATION_HASH,
        OPT_VERIFICATION_SALT,
        OPT_DERIVED_KEY_SALT,
        OPT_ENCRYPTED_DATA_KEY,
    ];

    /// Read material from option values; `None` when protection was never set up
    pub fn from_options(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        Some(Self {
            verification_hash: lookup(OPT_VERIFICATION_HASH)?,
            verification_salt: lookup(OPT_VERIFICATION_SALT)?,
            derived_key_salt: lookup(OPT_DERIVED_KEY_SALT)?,
            encrypted_data_key: lookup(OPT_ENCRYPTED_DATA_KEY)?,
        })
    }

    /// Option rows to persist
    pub fn to_option_rows(&self, utc_date_modified: &str) -> Vec<OptionRow> {
        [
            (OPT_VERIFICATION_HASH, &self.verification_hash),
            (OPT_VERIFICATION_SALT, &self.verification_salt),
            (OPT_DERIVED_KEY_SALT, &self.derived_key_salt),
            (OPT_ENCRYPTED_DATA_KEY, &self.encrypted_data_key),
        ]
        .into_iter()
        .map(|(name, value)| OptionRow {
            name: name.to_string(),
            value: value.clone(),
            is_synced: true,
            utc_date_modified: utc_date_modified.to_string(),
        })
        .collect()
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial").finish_non_exhaustive()
    }
}

/// Holds the protected session, if any
pub struct EncryptionGate {
    kdf: KdfConfig,
    timeout: Duration,
    session: RwLock<Option<Arc<ActiveSession>>>,
    next_session_id: AtomicU64,
}

impl EncryptionGate {
    pub fn new(config: &ProtectedSessionConfig) -> Self {
        Self {
            kdf: config.kdf,
            timeout: config.timeout(),
            session: RwLock::new(None),
            next_session_id: AtomicU64::new(1),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Set up protection for a new installation: random data key wrapped under `secret`
    pub fn create_key_material(&self, secret: &str) -> TrellisResult<KeyMaterial> {
        let data_key = crypto::random_key();
        self.wrap(secret, &data_key)
    }

    /// Re-wrap the existing data key under a new secret. Protected content is untouched.
    pub fn rewrap_key_material(
        &self,
        material: &KeyMaterial,
        old_secret: &str,
        new_secret: &str,
    ) -> TrellisResult<KeyMaterial> {
        let data_key = self.unwrap_data_key(material, old_secret)?;
        self.wrap(new_secret, &data_key)
    }

    /// Verify `secret` and open a session. An already open session is replaced.
    pub fn start_session(
        &self,
        material: &KeyMaterial,
        secret: &str,
    ) -> TrellisResult<SessionToken> {
        let data_key = self.unwrap_data_key(material, secret)?;
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(ActiveSession::new(id, data_key));
        let token = SessionToken::new(&session);

        *self.session.write() = Some(session);
        info!(session_id = id, "Protected session started");
        Ok(token)
    }

    /// Close the session. Every outstanding token dies and the data key is zeroised.
    pub fn end_session(&self) -> bool {
        let ended = self.session.write().take();
        match ended {
            Some(session) => {
                info!(session_id = session.id, "Protected session ended");
                true
            }
            None => false,
        }
    }

    /// Token for the open session
    pub fn token(&self) -> Option<SessionToken> {
        self.session.read().as_ref().map(SessionToken::new)
    }

    pub fn is_active(&self) -> bool {
        self.session.read().is_some()
    }

    /// Open and idle for at least the configured timeout
    pub fn is_expired(&self) -> bool {
        self.session
            .read()
            .as_ref()
            .is_some_and(|s| s.idle_for() >= self.timeout)
    }

    /// Count as activity without reading anything
    pub fn touch(&self) {
        if let Some(session) = self.session.read().as_ref() {
            session.touch();
        }
    }

    fn wrap(&self, secret: &str, data_key: &SecretKey) -> TrellisResult<KeyMaterial> {
        let verification_salt = crypto::random_salt();
        let derived_key_salt = crypto::random_salt();

        let verification_hash =
            crypto::derive_key(secret.as_bytes(), &verification_salt, &self.kdf)?;
        let derived_key = crypto::derive_key(secret.as_bytes(), &derived_key_salt, &self.kdf)?;
        let encrypted_data_key = crypto::encrypt(&derived_key[..], &data_key[..])?;

        Ok(KeyMaterial {
            verification_hash: STANDARD.encode(&verification_hash[..]),
            verification_salt: STANDARD.encode(verification_salt),
            derived_key_salt: STANDARD.encode(derived_key_salt),
            encrypted_data_key,
        })
    }

    fn unwrap_data_key(&self, material: &KeyMaterial, secret: &str) -> TrellisResult<SecretKey> {
        let verification_salt = decode_material(&material.verification_salt)?;
        let expected_hash = decode_material(&material.verification_hash)?;

        let given_hash = crypto::derive_key(secret.as_bytes(), &verification_salt, &self.kdf)?;
        if !crypto::constant_time_eq(&given_hash[..], &expected_hash) {
            debug!("Secret verification failed");
            return Err(TrellisError::AuthenticationFailed);
        }

        let derived_key_salt = decode_material(&material.derived_key_salt)?;
        let derived_key = crypto::derive_key(secret.as_bytes(), &derived_key_salt, &self.kdf)?;
        let raw = Zeroizing::new(
            crypto::decrypt(&derived_key[..], &material.encrypted_data_key)
                .map_err(|_| TrellisError::AuthenticationFailed)?,
        );
        if raw.len() != KEY_LEN {
            return Err(TrellisError::Crypto(format!(
                "stored data key has length {}",
                raw.len()
            )));
        }

        let mut data_key = Zeroizing::new([0u8; KEY_LEN]);
        data_key.copy_from_slice(&raw);
        Ok(data_key)
    }
}

fn decode_material(value: &str) -> TrellisResult<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| TrellisError::Crypto(format!("malformed key material: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> EncryptionGate {
        EncryptionGate::new(&ProtectedSessionConfig {
            timeout_secs: 60,
            reaper_interval_secs: 1,
            kdf: KdfConfig::insecure_fast(),
        })
    }

    #[test]
    fn test_correct_secret_opens_session() {
        let gate = gate();
        let material = gate.create_key_material("correct horse").unwrap();

        let token = gate.start_session(&material, "correct horse").unwrap();
        assert!(token.is_alive());
        assert!(gate.is_active());
        assert!(!gate.is_expired());
    }

    #[test]
    fn test_wrong_secret_is_authentication_failure() {
        let gate = gate();
        let material = gate.create_key_material("correct horse").unwrap();

        let err = gate.start_session(&material, "battery staple").unwrap_err();
        assert!(matches!(err, TrellisError::AuthenticationFailed));
        assert!(!gate.is_active());
    }

    #[test]
    fn test_end_session_kills_tokens() {
        let gate = gate();
        let material = gate.create_key_material("pw").unwrap();
        let token = gate.start_session(&material, "pw").unwrap();

        assert!(gate.end_session());
        assert!(!token.is_alive());
        assert!(gate.token().is_none());
        assert!(!gate.end_session());
    }

    #[test]
    fn test_sessions_share_the_same_data_key() {
        let gate = gate();
        let material = gate.create_key_material("pw").unwrap();

        let first = gate.start_session(&material, "pw").unwrap();
        let payload = first
            .with_key(|key| crypto::encrypt(key, b"note body"))
            .unwrap();
        gate.end_session();

        let second = gate.start_session(&material, "pw").unwrap();
        let plain = second.with_key(|key| crypto::decrypt(key, &payload)).unwrap();
        assert_eq!(plain, b"note body");
    }

    #[test]
    fn test_rewrap_keeps_data_key() {
        let gate = gate();
        let material = gate.create_key_material("old").unwrap();
        let token = gate.start_session(&material, "old").unwrap();
        let payload = token.with_key(|key| crypto::encrypt(key, b"x")).unwrap();

        let rewrapped = gate.rewrap_key_material(&material, "old", "new").unwrap();
        assert!(matches!(
            gate.start_session(&rewrapped, "old"),
            Err(TrellisError::AuthenticationFailed)
        ));
        let token = gate.start_session(&rewrapped, "new").unwrap();
        assert_eq!(token.with_key(|key| crypto::decrypt(key, &payload)).unwrap(), b"x");
    }

    #[test]
    fn test_rewrap_requires_old_secret() {
        let gate = gate();
        let material = gate.create_key_material("old").unwrap();
        assert!(matches!(
            gate.rewrap_key_material(&material, "wrong", "new"),
            Err(TrellisError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_key_material_round_trips_through_options() {
        let gate = gate();
        let material = gate.create_key_material("pw").unwrap();
        let rows = material.to_option_rows("2024-01-01 00:00:00.000Z");
        assert_eq!(rows.len(), 4);

        let restored = KeyMaterial::from_options(|name| {
            rows.iter().find(|r| r.name == name).map(|r| r.value.clone())
        })
        .unwrap();
        assert_eq!(restored, material);
        assert!(KeyMaterial::from_options(|_| None).is_none());
    }

    #[test]
    fn test_zero_timeout_expires_immediately() {
        let gate = EncryptionGate::new(&ProtectedSessionConfig {
            timeout_secs: 0,
            reaper_interval_secs: 1,
            kdf: KdfConfig::insecure_fast(),
        });
        let material = gate.create_key_material("pw").unwrap();
        gate.start_session(&material, "pw").unwrap();
        assert!(gate.is_expired());
    }
}
