//! Key derivation and authenticated encryption
//!
//! Ciphertexts are `base64(nonce || ciphertext || tag)` using AES-256-GCM. Decryption
//! failures are never turned into plaintext: a wrong key, a truncated payload and a
//! tampered payload all report [`TrellisError::DecryptionFailed`].

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::RngCore;
use trellis_config::KdfConfig;
use zeroize::Zeroizing;

use crate::error::{TrellisError, TrellisResult};

/// Length of data keys and derived keys
pub const KEY_LEN: usize = 32;
/// Length of the random salts stored per installation
pub const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// 256-bit key that is zeroised on drop
pub type SecretKey = Zeroizing<[u8; KEY_LEN]>;

/// Derive a key from `secret` with scrypt. Deliberately slow.
pub fn derive_key(secret: &[u8], salt: &[u8], kdf: &KdfConfig) -> TrellisResult<SecretKey> {
    let params = scrypt::Params::new(kdf.log_n, kdf.r, kdf.p, KEY_LEN)
        .map_err(|e| TrellisError::Crypto(format!("invalid scrypt parameters: {}", e)))?;
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    scrypt::scrypt(secret, salt, &params, &mut key[..])
        .map_err(|e| TrellisError::Crypto(format!("scrypt failed: {}", e)))?;
    Ok(key)
}

/// Fresh random data key
pub fn random_key() -> SecretKey {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    rand::rng().fill_bytes(&mut key[..]);
    key
}

/// Fresh random salt
pub fn random_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}

/// Encrypt `plaintext` under `key`
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> TrellisResult<String> {
    let cipher = cipher(key)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| TrellisError::Crypto(format!("AES-GCM encrypt failed: {}", e)))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(out))
}

/// Decrypt a payload produced by [`encrypt`]
pub fn decrypt(key: &[u8], payload: &str) -> TrellisResult<Vec<u8>> {
    let cipher = cipher(key)?;
    let raw = STANDARD
        .decode(payload.trim())
        .map_err(|_| TrellisError::DecryptionFailed)?;
    if raw.len() < NONCE_LEN {
        return Err(TrellisError::DecryptionFailed);
    }
    let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| TrellisError::DecryptionFailed)
}

/// Decrypt a payload that must hold UTF-8 text
pub fn decrypt_string(key: &[u8], payload: &str) -> TrellisResult<String> {
    let bytes = decrypt(key, payload)?;
    String::from_utf8(bytes).map_err(|_| TrellisError::DecryptionFailed)
}

/// Compare two digests without short-circuiting on the first mismatch
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn cipher(key: &[u8]) -> TrellisResult<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key)
        .map_err(|e| TrellisError::Crypto(format!("AES key init failed: {}", e)))
}
