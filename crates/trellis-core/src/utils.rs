//! Ids and timestamps

use chrono::{Local, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;

/// Id of the graph root. The root is the only live note without a branch.
pub const ROOT_NOTE_ID: &str = "root";

const ENTITY_ID_LEN: usize = 12;

/// Random 12-character alphanumeric id
pub fn new_entity_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(ENTITY_ID_LEN)
        .map(char::from)
        .collect()
}

/// Joins parent and child note ids in a branch id. Never valid inside a note id.
pub const BRANCH_ID_SEPARATOR: char = '_';

/// Branch ids are derived from the placement so that a note can only be placed once
/// under a given parent, on every replica
pub fn branch_id_for(parent_note_id: &str, note_id: &str) -> String {
    format!("{}{}{}", parent_note_id, BRANCH_ID_SEPARATOR, note_id)
}

/// `2024-03-01 14:05:09.123Z`
pub fn utc_now() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S%.3fZ").to_string()
}

/// `2024-03-01 15:05:09.123+0100`
pub fn local_now() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.3f%z").to_string()
}

/// UTC timestamp `age` in the past, in the same format as [`utc_now`]
pub fn utc_before(age: chrono::Duration) -> String {
    (Utc::now() - age)
        .format("%Y-%m-%d %H:%M:%S%.3fZ")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ids_are_unique_and_alphanumeric() {
        let a = new_entity_id();
        let b = new_entity_id();
        assert_eq!(a.len(), ENTITY_ID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_utc_timestamps_sort_lexicographically() {
        let earlier = utc_before(chrono::Duration::days(1));
        let now = utc_now();
        assert!(earlier < now);
        assert!(now.ends_with('Z'));
    }
}
