//! Becca, the in-memory note graph
//!
//! Readers take the current [`BeccaSnapshot`] and query it without further locking.
//! Writers build a patched copy and publish it with one pointer swap, so a reader never
//! sees half of a mutation. Until the first load completes every query answers
//! [`TrellisError::NotReady`].

mod inheritance;
mod loader;
mod paths;
mod snapshot;

pub use inheritance::{is_inheritance_relation, INHERITANCE_RELATIONS};
pub use snapshot::{BeccaSnapshot, BeccaStats};

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::entities::{Attribute, Branch, EntityName, Note};
use crate::error::{TrellisError, TrellisResult};
use crate::protected::SessionToken;
use crate::store::RowStore;

#[derive(Default)]
pub struct Becca {
    current: RwLock<Option<Arc<BeccaSnapshot>>>,
    update_lock: Mutex<()>,
}

impl Becca {
    /// An empty, not yet loaded cache
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.current.read().is_some()
    }

    /// Current snapshot
    pub fn snapshot(&self) -> TrellisResult<Arc<BeccaSnapshot>> {
        self.current.read().clone().ok_or(TrellisError::NotReady)
    }

    /// Build the graph from every live row in the store
    pub fn load<S: RowStore>(
        &self,
        store: &S,
        token: Option<&SessionToken>,
    ) -> TrellisResult<BeccaStats> {
        let started = Instant::now();
        let snapshot = loader::load_snapshot(store, token)?;
        Ok(self.publish_loaded(snapshot, started))
    }

    /// Like [`Becca::load`], yielding to the runtime between batches. Nothing is
    /// published before the whole graph is built.
    pub async fn load_incremental<S: RowStore>(
        &self,
        store: &S,
        batch_size: usize,
        token: Option<&SessionToken>,
    ) -> TrellisResult<BeccaStats> {
        let started = Instant::now();
        let snapshot = loader::load_snapshot_incremental(store, batch_size, token).await?;
        Ok(self.publish_loaded(snapshot, started))
    }

    fn publish_loaded(&self, snapshot: BeccaSnapshot, started: Instant) -> BeccaStats {
        let stats = snapshot.stats();
        let _guard = self.update_lock.lock();
        *self.current.write() = Some(Arc::new(snapshot));
        info!(
            notes = stats.notes,
            branches = stats.branches,
            attributes = stats.attributes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Note cache loaded"
        );
        stats
    }

    /// Re-read one row and patch the graph. A row that is gone or soft-deleted leaves
    /// the live indices.
    pub fn reload<S: RowStore>(
        &self,
        store: &S,
        entity: EntityName,
        id: &str,
        token: Option<&SessionToken>,
    ) -> TrellisResult<()> {
        let row = store.get(entity, id)?;
        self.update(|snapshot| match row {
            Some(row) => snapshot.apply_row(row, token),
            None => snapshot.remove_entity(entity, id),
        })
    }

    /// Copy the current snapshot, patch it and publish the copy
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut BeccaSnapshot) -> R) -> TrellisResult<R> {
        let _guard = self.update_lock.lock();
        let current = self.snapshot()?;
        let mut next = BeccaSnapshot::clone(&current);
        let out = f(&mut next);
        *self.current.write() = Some(Arc::new(next));
        Ok(out)
    }

    /// Decrypt protected titles for a freshly started session
    pub(crate) fn unseal_all(&self, token: &SessionToken) -> TrellisResult<usize> {
        self.update(|snapshot| snapshot.unseal_all(token))
    }

    /// Drop every decrypted title. An unloaded cache has nothing to scrub.
    pub(crate) fn scrub_all(&self) -> usize {
        if !self.is_ready() {
            return 0;
        }
        self.update(BeccaSnapshot::scrub_all).unwrap_or(0)
    }

    pub fn note(&self, note_id: &str) -> TrellisResult<Option<Arc<Note>>> {
        Ok(self.snapshot()?.note(note_id))
    }

    pub fn branch(&self, branch_id: &str) -> TrellisResult<Option<Arc<Branch>>> {
        Ok(self.snapshot()?.branch(branch_id))
    }

    pub fn attribute(&self, attribute_id: &str) -> TrellisResult<Option<Arc<Attribute>>> {
        Ok(self.snapshot()?.attribute(attribute_id))
    }

    pub fn child_branches(&self, note_id: &str) -> TrellisResult<Vec<Arc<Branch>>> {
        Ok(self.snapshot()?.child_branches(note_id))
    }

    pub fn note_path(
        &self,
        note_id: &str,
        hoisted_note_id: &str,
    ) -> TrellisResult<Option<Vec<String>>> {
        Ok(self.snapshot()?.note_path(note_id, hoisted_note_id))
    }

    pub fn inherited_attributes(
        &self,
        note_id: &str,
        name: Option<&str>,
    ) -> TrellisResult<Vec<Arc<Attribute>>> {
        Ok(self.snapshot()?.inherited_attributes(note_id, name))
    }

    pub fn stats(&self) -> TrellisResult<BeccaStats> {
        Ok(self.snapshot()?.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{AttributeType, EntityRow};
    use crate::store::MemoryRowStore;
    use crate::test_support::*;

    fn graph(rows: Vec<EntityRow>) -> Arc<BeccaSnapshot> {
        let store = MemoryRowStore::new();
        store.seed(rows);
        let becca = Becca::new();
        becca.load(&store, None).unwrap();
        becca.snapshot().unwrap()
    }

    /// root -> Root -> A, root -> Root2 -> A (clone)
    fn clone_fixture() -> Vec<EntityRow> {
        vec![
            note("root", "root"),
            note("Root", "Root"),
            note("Root2", "Root2"),
            note("A", "A"),
            branch("Root", "root", 10),
            branch("Root2", "root", 20),
            branch("A", "Root", 10),
            branch("A", "Root2", 10),
        ]
    }

    #[test]
    fn test_queries_before_load_are_not_ready() {
        let becca = Becca::new();
        assert!(!becca.is_ready());
        assert!(matches!(becca.note("root"), Err(TrellisError::NotReady)));
        assert!(matches!(
            becca.note_path("root", "root"),
            Err(TrellisError::NotReady)
        ));
        assert_eq!(becca.scrub_all(), 0);
    }

    #[test]
    fn test_unknown_ids_are_absent_not_errors() {
        let snapshot = graph(clone_fixture());
        assert!(snapshot.note("nope").is_none());
        assert!(snapshot.branch("nope").is_none());
        assert!(snapshot.attribute("nope").is_none());
        assert!(snapshot.child_branches("nope").is_empty());
        assert!(snapshot.note_path("nope", "root").is_none());
    }

    #[test]
    fn test_clone_paths_follow_hoisted_note() {
        let snapshot = graph(clone_fixture());

        let children = snapshot.child_branches("Root");
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].note_id, "A");

        assert_eq!(snapshot.note_path("A", "Root").unwrap(), ["Root", "A"]);
        assert_eq!(snapshot.note_path("A", "Root2").unwrap(), ["Root2", "A"]);
        assert_eq!(snapshot.note_path("A", "A").unwrap(), ["A"]);
        assert_eq!(snapshot.all_note_paths("A").len(), 2);
    }

    #[test]
    fn test_note_path_prefers_shortest_then_lowest_position() {
        let snapshot = graph(vec![
            note("root", "root"),
            note("deep", "deep"),
            note("mid", "mid"),
            note("x", "x"),
            note("y", "y"),
            note("target", "target"),
            branch("deep", "root", 10),
            branch("mid", "deep", 10),
            branch("target", "mid", 10),
            branch("x", "root", 20),
            branch("y", "root", 30),
            branch("target", "y", 5),
            branch("target", "x", 50),
        ]);

        let path = snapshot.note_path("target", "root").unwrap();
        assert_eq!(path, ["root", "y", "target"]);
    }

    #[test]
    fn test_children_ordered_by_position_then_creation() {
        let snapshot = graph(vec![
            note("root", "root"),
            note("b", "b"),
            note("a", "a"),
            note("c", "c"),
            branch("b", "root", 10),
            branch("a", "root", 10),
            branch("c", "root", 5),
        ]);
        let order: Vec<_> = snapshot
            .child_branches("root")
            .iter()
            .map(|b| b.note_id.clone())
            .collect();
        assert_eq!(order, ["c", "b", "a"]);
    }

    #[test]
    fn test_branch_to_missing_note_is_corruption() {
        let store = MemoryRowStore::new();
        store.seed(vec![note("root", "root"), branch("ghost", "root", 10)]);
        let becca = Becca::new();

        let err = becca.load(&store, None).unwrap_err();
        assert!(matches!(err, TrellisError::Corruption(_)));
        assert!(!becca.is_ready());
    }

    #[test]
    fn test_attribute_of_missing_note_is_corruption() {
        let store = MemoryRowStore::new();
        store.seed(vec![note("root", "root"), label("l1", "ghost", "x", "", false)]);
        assert!(matches!(
            Becca::new().load(&store, None),
            Err(TrellisError::Corruption(_))
        ));
    }

    #[test]
    fn test_deleted_rows_are_not_loaded() {
        let mut rows = clone_fixture();
        let mut gone = branch_row("A", "Root", 10);
        gone.is_deleted = true;
        rows.push(EntityRow::Branch(gone));

        let snapshot = graph(rows);
        assert!(snapshot.child_branches("Root").is_empty());
        assert_eq!(snapshot.note_path("A", "root").unwrap(), ["root", "Root2", "A"]);
    }

    #[test]
    fn test_inherited_attributes_once_through_diamond() {
        let snapshot = graph(vec![
            note("root", "root"),
            note("top", "top"),
            note("left", "left"),
            note("right", "right"),
            note("leaf", "leaf"),
            branch("top", "root", 10),
            branch("left", "top", 10),
            branch("right", "top", 20),
            branch("leaf", "left", 10),
            branch("leaf", "right", 10),
            label("color", "top", "color", "red", true),
            label("private", "top", "draft", "", false),
        ]);

        let attrs = snapshot.inherited_attributes("leaf", None);
        let ids: Vec<_> = attrs.iter().map(|a| a.attribute_id.as_str()).collect();
        assert_eq!(ids, ["color"]);
        assert_eq!(snapshot.label_value("leaf", "color").as_deref(), Some("red"));
        assert!(!snapshot.has_label("leaf", "draft"));
    }

    #[test]
    fn test_template_inheritance_is_single_hop() {
        let snapshot = graph(vec![
            note("root", "root"),
            note("templates", "templates"),
            note("book", "book"),
            note("base", "base"),
            note("mine", "mine"),
            branch("templates", "root", 10),
            branch("book", "templates", 10),
            branch("base", "templates", 20),
            branch("mine", "root", 20),
            label("tpl-area", "templates", "area", "library", true),
            label("book-kind", "book", "kind", "book", false),
            relation("book-base", "book", "template", "base"),
            label("base-only", "base", "baseOnly", "x", false),
            relation("mine-tpl", "mine", "template", "book"),
        ]);

        let attrs = snapshot.inherited_attributes("mine", None);
        let ids: Vec<_> = attrs.iter().map(|a| a.attribute_id.as_str()).collect();
        assert_eq!(ids, ["mine-tpl", "book-kind", "tpl-area"]);
        assert!(!snapshot.has_label("mine", "baseOnly"));
    }

    #[test]
    fn test_own_value_beats_branch_beats_template() {
        let snapshot = graph(vec![
            note("root", "root"),
            note("parent", "parent"),
            note("tpl", "tpl"),
            note("child", "child"),
            branch("parent", "root", 10),
            branch("tpl", "root", 20),
            branch("child", "parent", 10),
            label("p-color", "parent", "color", "blue", true),
            label("t-color", "tpl", "color", "green", false),
            relation("c-tpl", "child", "template", "tpl"),
        ]);
        assert_eq!(snapshot.label_value("child", "color").as_deref(), Some("blue"));

        let named = snapshot.inherited_attributes("child", Some("color"));
        assert_eq!(named.len(), 2);
        assert_eq!(named[1].attribute_id, "t-color");
    }

    #[test]
    fn test_template_relation_cycle_terminates() {
        let snapshot = graph(vec![
            note("root", "root"),
            note("a", "a"),
            note("b", "b"),
            branch("a", "root", 10),
            branch("b", "root", 20),
            relation("a-b", "a", "template", "b"),
            relation("b-a", "b", "template", "a"),
            relation("a-a", "a", "inherit", "a"),
            label("b-label", "b", "fromB", "1", true),
        ]);
        let attrs = snapshot.inherited_attributes("a", None);
        assert!(attrs.iter().any(|a| a.attribute_id == "b-label"));
        assert!(!attrs.iter().any(|a| a.attribute_id == "b-a"));
    }

    #[test]
    fn test_ancestry_queries() {
        let snapshot = graph(clone_fixture());
        assert_eq!(snapshot.ancestors("A"), ["Root", "Root2", "root"]);
        assert!(snapshot.is_ancestor("root", "A"));
        assert!(!snapshot.is_ancestor("A", "Root"));
        assert_eq!(snapshot.subtree_note_ids("Root"), ["Root", "A"]);
        assert_eq!(snapshot.parent_notes("A").len(), 2);
    }

    #[test]
    fn test_label_lookups() {
        let snapshot = graph(vec![
            note("root", "root"),
            note("a", "a"),
            note("b", "b"),
            branch("a", "root", 10),
            branch("b", "root", 20),
            label("a-todo", "a", "todo", "yes", false),
            label("b-todo", "b", "todo", "no", false),
            relation("a-b", "a", "seeAlso", "b"),
        ]);
        assert_eq!(snapshot.find_attributes(AttributeType::Label, "todo").len(), 2);
        let yes = snapshot.notes_with_label("todo", Some("yes"));
        assert_eq!(yes.len(), 1);
        assert_eq!(yes[0].note_id, "a");
        assert_eq!(snapshot.relation_target("a", "seeAlso").unwrap().note_id, "b");
        assert_eq!(snapshot.incoming_relations("b").len(), 1);
    }

    #[test]
    fn test_reload_patches_single_row() {
        let store = MemoryRowStore::new();
        store.seed(clone_fixture());
        let becca = Becca::new();
        becca.load(&store, None).unwrap();
        let before = becca.snapshot().unwrap();

        let mut moved = branch_row("A", "Root", 30);
        moved.is_deleted = true;
        store.seed([EntityRow::Branch(moved)]);
        becca
            .reload(&store, EntityName::Branches, "Root_A", None)
            .unwrap();

        assert!(becca.child_branches("Root").unwrap().is_empty());
        assert_eq!(before.child_branches("Root").len(), 1);
    }

    #[tokio::test]
    async fn test_incremental_load_matches_bulk_load() {
        let store = MemoryRowStore::new();
        store.seed(clone_fixture());
        store.seed([label("l", "A", "x", "1", true)]);

        let bulk = Becca::new();
        let bulk_stats = bulk.load(&store, None).unwrap();
        let incremental = Becca::new();
        let stats = incremental.load_incremental(&store, 2, None).await.unwrap();

        assert_eq!(stats, bulk_stats);
        assert_eq!(
            incremental.note_path("A", "Root2").unwrap().unwrap(),
            ["Root2", "A"]
        );
    }
}
