//! Content addressing and change hashes
//!
//! - Blob ids: BLAKE3 over the stored bytes, so identical content shares one blob
//! - Entity hashes: SHA-256 over a canonical field list, so two replicas that converge
//!   on the same entity state compute the same hash

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

const BLOB_ID_LEN: usize = 20;

/// Deterministic id for a blob holding `content`
pub fn blob_id_for(content: &[u8]) -> String {
    let hash = blake3::hash(content);
    let mut id = URL_SAFE_NO_PAD.encode(hash.as_bytes());
    id.truncate(BLOB_ID_LEN);
    id
}

/// BLAKE3 hex digest of raw bytes, used as the content field of a blob's entity hash
pub fn content_digest(content: &[u8]) -> String {
    hex::encode(blake3::hash(content).as_bytes())
}

/// SHA-256 over length-prefixed fields (`len:field`), hex encoded. The prefixes keep
/// field boundaries unambiguous whatever the fields contain.
pub fn entity_hash(fields: &[&str], is_deleted: bool) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update(field.len().to_string().as_bytes());
        hasher.update(b":");
        hasher.update(field.as_bytes());
    }
    if is_deleted {
        hasher.update(b"!deleted");
    }
    hex::encode(hasher.finalize())
}

/// Hash recorded for a physically erased entity
pub fn erased_hash(entity_id: &str) -> String {
    entity_hash(&[entity_id, "erased"], false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_id_is_deterministic() {
        assert_eq!(blob_id_for(b"hello"), blob_id_for(b"hello"));
        assert_ne!(blob_id_for(b"hello"), blob_id_for(b"hello!"));
        assert_eq!(blob_id_for(b"").len(), BLOB_ID_LEN);
    }

    #[test]
    fn test_entity_hash_separates_fields() {
        assert_ne!(entity_hash(&["a", "bc"], false), entity_hash(&["ab", "c"], false));
        assert_ne!(
            entity_hash(&["T|code", "m"], false),
            entity_hash(&["T", "code|m"], false)
        );
        assert_ne!(entity_hash(&["1:a", ""], false), entity_hash(&["", "1:a"], false));
        assert_ne!(entity_hash(&["x", "!deleted"], false), entity_hash(&["x", ""], true));
    }

    #[test]
    fn test_deleted_flag_changes_hash() {
        assert_ne!(entity_hash(&["x"], false), entity_hash(&["x"], true));
    }

    #[test]
    fn test_content_digest_matches_blake3_vector() {
        assert_eq!(
            content_digest(b"abc"),
            "6437b3ac38465133ffb63b75273a8db548c558465d79db03fd359c6cd5bd9d85"
        );
    }
}
