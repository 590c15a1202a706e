//! End-to-end note graph scenarios on a SQLite-backed store

use std::sync::Arc;
use tempfile::TempDir;
use trellis_config::{StorageConfig, TrellisConfig};
use trellis_core::{
    ApplyOutcome, Branch, EntityName, EntityRow, NewBranch, NewNote, NoteService, RowStore,
    StoreError, TrellisError, LOCKED_PLACEHOLDER,
};
use trellis_sqlite::SqliteRowStore;

fn config_at(dir: &TempDir) -> TrellisConfig {
    TrellisConfig {
        storage: StorageConfig {
            path: dir.path().join("document.db"),
            ..StorageConfig::default()
        },
        ..TrellisConfig::for_testing()
    }
}

fn open(config: &TrellisConfig) -> NoteService<SqliteRowStore> {
    let store = Arc::new(SqliteRowStore::open(&config.storage).expect("open store"));
    let service = NoteService::open(store, config).expect("load cache");
    service.ensure_root().expect("root");
    service
}

fn memory_service() -> NoteService<SqliteRowStore> {
    open(&TrellisConfig::for_testing())
}

#[test]
fn cloned_note_has_a_path_through_each_parent() {
    let service = memory_service();
    service
        .create_note(NewNote::new("root", "A").with_id("A"), None)
        .unwrap();
    service
        .create_note(NewNote::new("root", "Folder").with_id("F"), None)
        .unwrap();
    service.create_branch(NewBranch::new("A", "F")).unwrap();

    let snapshot = service.snapshot().unwrap();
    assert_eq!(snapshot.note_path("A", "root").unwrap(), ["root", "A"]);
    assert_eq!(snapshot.note_path("A", "F").unwrap(), ["F", "A"]);
    let paths = snapshot.all_note_paths("A");
    assert_eq!(paths.len(), 2);
    assert_eq!(snapshot.parent_notes("A").len(), 2);
}

#[test]
fn state_survives_reopening_the_database() {
    let dir = TempDir::new().unwrap();
    let config = config_at(&dir);
    let changes_before;
    {
        let service = open(&config);
        service
            .create_note(NewNote::new("root", "Kept").with_id("K").with_content("body"), None)
            .unwrap();
        service
            .create_note(NewNote::new("K", "Child").with_id("C"), None)
            .unwrap();
        changes_before = service.changes_since(0, 10_000).unwrap();
    }

    let service = open(&config);
    let snapshot = service.snapshot().unwrap();
    assert_eq!(snapshot.note_path("C", "root").unwrap(), ["root", "K", "C"]);
    assert_eq!(service.note_content("K", None).unwrap(), b"body");
    assert_eq!(service.changes_since(0, 10_000).unwrap(), changes_before);
}

#[test]
fn protected_titles_are_ciphertext_at_rest_and_locked_after_reopen() {
    let dir = TempDir::new().unwrap();
    let config = config_at(&dir);
    {
        let service = open(&config);
        service.initialize_protection("correct horse").unwrap();
        let token = service.start_protected_session("correct horse").unwrap();
        service
            .create_note(
                NewNote::new("root", "Secret")
                    .with_id("S")
                    .with_content("hidden")
                    .protected(),
                Some(&token),
            )
            .unwrap();
        let note = service.becca().note("S").unwrap().unwrap();
        assert_eq!(note.title(&token).unwrap(), "Secret");

        let row = service.store().get(EntityName::Notes, "S").unwrap().unwrap();
        match row {
            EntityRow::Note(row) => assert_ne!(row.title, "Secret"),
            other => panic!("unexpected row {:?}", other),
        }
    }

    let service = open(&config);
    let note = service.becca().note("S").unwrap().unwrap();
    assert!(note.is_locked());
    assert_eq!(note.display_title(None), LOCKED_PLACEHOLDER);
    assert!(matches!(
        service.note_content("S", None),
        Err(TrellisError::SessionRequired)
    ));

    assert!(matches!(
        service.start_protected_session("wrong"),
        Err(TrellisError::AuthenticationFailed)
    ));
    let token = service.start_protected_session("correct horse").unwrap();
    let note = service.becca().note("S").unwrap().unwrap();
    assert_eq!(note.display_title(Some(&token)), "Secret");
    assert_eq!(service.note_content("S", Some(&token)).unwrap(), b"hidden");
}

#[test]
fn deleting_one_clone_keeps_the_note() {
    let service = memory_service();
    service
        .create_note(NewNote::new("root", "A").with_id("A"), None)
        .unwrap();
    service
        .create_note(NewNote::new("root", "B").with_id("B"), None)
        .unwrap();
    let clone = service.create_branch(NewBranch::new("A", "B")).unwrap();

    assert!(!service.delete_branch(&clone.branch_id).unwrap());
    assert!(service.becca().note("A").unwrap().is_some());

    let last = service.snapshot().unwrap().branch_for("A", "root").unwrap();
    assert!(service.delete_branch(&last.branch_id).unwrap());
    assert!(service.becca().note("A").unwrap().is_none());

    match service.store().get(EntityName::Notes, "A").unwrap() {
        Some(EntityRow::Note(row)) => assert!(row.is_deleted),
        other => panic!("expected a soft-deleted note, got {:?}", other),
    }
}

#[test]
fn dangling_branch_fails_the_load() {
    let store = Arc::new(SqliteRowStore::memory().unwrap());
    let dangling = EntityRow::Branch(Branch {
        branch_id: "ghost_root".into(),
        note_id: "ghost".into(),
        parent_note_id: "root".into(),
        prefix: None,
        note_position: 10,
        is_expanded: false,
        is_deleted: false,
        utc_date_modified: "2024-01-01 00:00:00.000Z".into(),
    });
    store
        .transaction(|tx| {
            tx.put(&dangling)?;
            Ok::<_, StoreError>(())
        })
        .unwrap();

    let result = NoteService::open(store, &TrellisConfig::for_testing());
    assert!(matches!(result, Err(TrellisError::Corruption(_))));
}

#[test]
fn replicas_converge_and_reapplying_is_a_noop() {
    let a = memory_service();
    let b = memory_service();
    let cursor = a.changes_since(0, 10_000).unwrap().last().unwrap().id;
    a.create_note(NewNote::new("root", "Shared").with_id("S").with_content("x"), None)
        .unwrap();
    a.create_note(NewNote::new("S", "Inner").with_id("I"), None)
        .unwrap();

    let outgoing = a.outgoing_changes(cursor, 10_000).unwrap();
    for remote in outgoing.clone() {
        assert!(matches!(
            b.apply_remote(remote).unwrap(),
            ApplyOutcome::Applied(_)
        ));
    }
    let feed = b.changes_since(0, 10_000).unwrap();
    for remote in outgoing {
        assert_eq!(b.apply_remote(remote).unwrap(), ApplyOutcome::AlreadyApplied);
    }
    assert_eq!(b.changes_since(0, 10_000).unwrap(), feed);
    assert_eq!(
        b.snapshot().unwrap().note_path("I", "root").unwrap(),
        ["root", "S", "I"]
    );
}

#[tokio::test]
async fn incremental_load_matches_full_load() {
    let dir = TempDir::new().unwrap();
    let mut config = config_at(&dir);
    config.cache.load_batch_size = 2;
    {
        let service = open(&config);
        for i in 0..7 {
            service
                .create_note(NewNote::new("root", format!("n{}", i)), None)
                .unwrap();
        }
    }

    let store = Arc::new(SqliteRowStore::open(&config.storage).unwrap());
    let full = NoteService::open(store.clone(), &config).unwrap();
    let incremental = NoteService::open_incremental(store, &config).await.unwrap();
    assert_eq!(
        full.snapshot().unwrap().stats(),
        incremental.snapshot().unwrap().stats()
    );
    assert_eq!(incremental.snapshot().unwrap().child_notes("root").len(), 7);
}
