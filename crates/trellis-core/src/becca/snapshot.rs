//! Immutable graph snapshot
//!
//! Entities live in by-id maps and reference each other only by id. Derived indices
//! (children, parents, placements, attributes by owner and by name, incoming relations)
//! are kept in step by the `upsert_*`/`remove_*` methods, which only run on a private
//! copy before it is published.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::entities::{
    Attachment, Attribute, Branch, EntityName, EntityRow, Note, OptionRow, Revision,
};
use crate::protected::SessionToken;

/// Entity counts of a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BeccaStats {
    pub notes: usize,
    pub branches: usize,
    pub attributes: usize,
    pub revisions: usize,
    pub attachments: usize,
    pub options: usize,
    pub protected_notes: usize,
    pub locked_notes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct BeccaSnapshot {
    pub(crate) notes: HashMap<String, Arc<Note>>,
    pub(crate) branches: HashMap<String, Arc<Branch>>,
    pub(crate) attributes: HashMap<String, Arc<Attribute>>,
    pub(crate) revisions: HashMap<String, Arc<Revision>>,
    pub(crate) attachments: HashMap<String, Arc<Attachment>>,
    pub(crate) options: HashMap<String, Arc<OptionRow>>,

    /// parent note -> branch ids, sibling order
    pub(crate) children: HashMap<String, Vec<String>>,
    /// note -> branch ids placing it, by position
    pub(crate) parents: HashMap<String, Vec<String>>,
    /// (note, parent) -> branch id
    pub(crate) placements: HashMap<(String, String), String>,
    /// owner note -> attribute ids, by position
    pub(crate) attrs_by_owner: HashMap<String, Vec<String>>,
    pub(crate) attrs_by_name: HashMap<String, Vec<String>>,
    /// relation target -> relation attribute ids
    pub(crate) incoming_relations: HashMap<String, Vec<String>>,
    pub(crate) attachments_by_owner: HashMap<String, Vec<String>>,
    pub(crate) revisions_by_note: HashMap<String, Vec<String>>,

    /// Creation order used to break position ties
    pub(crate) ordinals: HashMap<(EntityName, String), i64>,
    pub(crate) next_ordinal: i64,
}

impl BeccaSnapshot {
    pub fn note(&self, note_id: &str) -> Option<Arc<Note>> {
        self.notes.get(note_id).cloned()
    }

    pub fn branch(&self, branch_id: &str) -> Option<Arc<Branch>> {
        self.branches.get(branch_id).cloned()
    }

    pub fn attribute(&self, attribute_id: &str) -> Option<Arc<Attribute>> {
        self.attributes.get(attribute_id).cloned()
    }

    pub fn revision(&self, revision_id: &str) -> Option<Arc<Revision>> {
        self.revisions.get(revision_id).cloned()
    }

    pub fn attachment(&self, attachment_id: &str) -> Option<Arc<Attachment>> {
        self.attachments.get(attachment_id).cloned()
    }

    pub fn option(&self, name: &str) -> Option<Arc<OptionRow>> {
        self.options.get(name).cloned()
    }

    pub fn option_value(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(|o| o.value.as_str())
    }

    pub fn has_note(&self, note_id: &str) -> bool {
        self.notes.contains_key(note_id)
    }

    pub fn notes(&self) -> impl Iterator<Item = &Arc<Note>> {
        self.notes.values()
    }

    pub fn branches(&self) -> impl Iterator<Item = &Arc<Branch>> {
        self.branches.values()
    }

    /// Live branch placing `note_id` under `parent_note_id`
    pub fn branch_for(&self, note_id: &str, parent_note_id: &str) -> Option<Arc<Branch>> {
        self.placements
            .get(&(note_id.to_string(), parent_note_id.to_string()))
            .and_then(|id| self.branch(id))
    }

    /// Attributes owned by the note, by position
    pub fn own_attributes(&self, note_id: &str) -> Vec<Arc<Attribute>> {
        self.resolve(&self.attributes, self.attrs_by_owner.get(note_id))
    }

    /// Relations pointing at the note
    pub fn incoming_relations(&self, note_id: &str) -> Vec<Arc<Attribute>> {
        self.resolve(&self.attributes, self.incoming_relations.get(note_id))
    }

    /// Attachments owned by a note or revision, by position
    pub fn attachments_of(&self, owner_id: &str) -> Vec<Arc<Attachment>> {
        let mut list = self.resolve(&self.attachments, self.attachments_by_owner.get(owner_id));
        list.sort_by_key(|a| a.position);
        list
    }

    /// Revisions of a note, oldest first
    pub fn revisions_of(&self, note_id: &str) -> Vec<Arc<Revision>> {
        let mut list = self.resolve(&self.revisions, self.revisions_by_note.get(note_id));
        list.sort_by(|a, b| a.utc_date_created.cmp(&b.utc_date_created));
        list
    }

    pub fn stats(&self) -> BeccaStats {
        BeccaStats {
            notes: self.notes.len(),
            branches: self.branches.len(),
            attributes: self.attributes.len(),
            revisions: self.revisions.len(),
            attachments: self.attachments.len(),
            options: self.options.len(),
            protected_notes: self.notes.values().filter(|n| n.is_protected()).count(),
            locked_notes: self.notes.values().filter(|n| n.is_locked()).count(),
        }
    }

    fn resolve<T>(&self, map: &HashMap<String, Arc<T>>, ids: Option<&Vec<String>>) -> Vec<Arc<T>> {
        ids.map(|ids| ids.iter().filter_map(|id| map.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    fn ordinal_for(&mut self, entity: EntityName, id: &str) -> i64 {
        let next = &mut self.next_ordinal;
        *self
            .ordinals
            .entry((entity, id.to_string()))
            .or_insert_with(|| {
                *next += 1;
                *next
            })
    }

    pub(crate) fn upsert_note(&mut self, note: Note) {
        self.notes.insert(note.note_id.clone(), Arc::new(note));
    }

    pub(crate) fn remove_note(&mut self, note_id: &str) -> Option<Arc<Note>> {
        self.notes.remove(note_id)
    }

    pub(crate) fn upsert_branch(&mut self, branch: Branch) {
        self.remove_branch(&branch.branch_id);
        self.ordinal_for(EntityName::Branches, &branch.branch_id);

        let id = branch.branch_id.clone();
        let note_id = branch.note_id.clone();
        let parent_id = branch.parent_note_id.clone();
        self.branches.insert(id.clone(), Arc::new(branch));
        self.placements
            .insert((note_id.clone(), parent_id.clone()), id.clone());

        let branches = &self.branches;
        let ordinals = &self.ordinals;
        let key = |id: &String| {
            (
                branches.get(id).map_or(i64::MAX, |b| b.note_position),
                ordinals
                    .get(&(EntityName::Branches, id.clone()))
                    .copied()
                    .unwrap_or(i64::MAX),
            )
        };

        let siblings = self.children.entry(parent_id).or_default();
        siblings.push(id.clone());
        siblings.sort_by_key(key);

        let parents = self.parents.entry(note_id).or_default();
        parents.push(id);
        parents.sort_by_key(key);
    }

    pub(crate) fn remove_branch(&mut self, branch_id: &str) -> Option<Arc<Branch>> {
        let branch = self.branches.remove(branch_id)?;
        remove_id(&mut self.children, &branch.parent_note_id, branch_id);
        remove_id(&mut self.parents, &branch.note_id, branch_id);
        let placement = (branch.note_id.clone(), branch.parent_note_id.clone());
        if self.placements.get(&placement).map(String::as_str) == Some(branch_id) {
            self.placements.remove(&placement);
        }
        Some(branch)
    }

    pub(crate) fn upsert_attribute(&mut self, attribute: Attribute) {
        self.remove_attribute(&attribute.attribute_id);
        self.ordinal_for(EntityName::Attributes, &attribute.attribute_id);

        let id = attribute.attribute_id.clone();
        let owner = attribute.note_id.clone();
        let name = attribute.name.clone();
        let target = attribute.target_note_id().map(str::to_string);
        self.attributes.insert(id.clone(), Arc::new(attribute));

        let attributes = &self.attributes;
        let ordinals = &self.ordinals;
        let owned = self.attrs_by_owner.entry(owner).or_default();
        owned.push(id.clone());
        owned.sort_by_key(|id| {
            (
                attributes.get(id).map_or(i64::MAX, |a| a.position),
                ordinals
                    .get(&(EntityName::Attributes, id.clone()))
                    .copied()
                    .unwrap_or(i64::MAX),
            )
        });

        self.attrs_by_name.entry(name).or_default().push(id.clone());
        if let Some(target) = target {
            self.incoming_relations.entry(target).or_default().push(id);
        }
    }

    pub(crate) fn remove_attribute(&mut self, attribute_id: &str) -> Option<Arc<Attribute>> {
        let attribute = self.attributes.remove(attribute_id)?;
        remove_id(&mut self.attrs_by_owner, &attribute.note_id, attribute_id);
        remove_id(&mut self.attrs_by_name, &attribute.name, attribute_id);
        if let Some(target) = attribute.target_note_id() {
            remove_id(&mut self.incoming_relations, target, attribute_id);
        }
        Some(attribute)
    }

    pub(crate) fn upsert_revision(&mut self, revision: Revision) {
        self.remove_revision(&revision.revision_id);
        self.revisions_by_note
            .entry(revision.note_id.clone())
            .or_default()
            .push(revision.revision_id.clone());
        self.revisions
            .insert(revision.revision_id.clone(), Arc::new(revision));
    }

    pub(crate) fn remove_revision(&mut self, revision_id: &str) -> Option<Arc<Revision>> {
        let revision = self.revisions.remove(revision_id)?;
        remove_id(&mut self.revisions_by_note, &revision.note_id, revision_id);
        Some(revision)
    }

    pub(crate) fn upsert_attachment(&mut self, attachment: Attachment) {
        self.remove_attachment(&attachment.attachment_id);
        self.attachments_by_owner
            .entry(attachment.owner_id.clone())
            .or_default()
            .push(attachment.attachment_id.clone());
        self.attachments
            .insert(attachment.attachment_id.clone(), Arc::new(attachment));
    }

    pub(crate) fn remove_attachment(&mut self, attachment_id: &str) -> Option<Arc<Attachment>> {
        let attachment = self.attachments.remove(attachment_id)?;
        remove_id(&mut self.attachments_by_owner, &attachment.owner_id, attachment_id);
        Some(attachment)
    }

    pub(crate) fn upsert_option(&mut self, option: OptionRow) {
        self.options.insert(option.name.clone(), Arc::new(option));
    }

    pub(crate) fn remove_entity(&mut self, entity: EntityName, id: &str) {
        match entity {
            EntityName::Notes => {
                self.remove_note(id);
            }
            EntityName::Branches => {
                self.remove_branch(id);
            }
            EntityName::Attributes => {
                self.remove_attribute(id);
            }
            EntityName::Revisions => {
                self.remove_revision(id);
            }
            EntityName::Attachments => {
                self.remove_attachment(id);
            }
            EntityName::Options => {
                self.options.remove(id);
            }
            EntityName::Blobs => {}
        }
    }

    /// Patch the snapshot with a row as stored. Deleted rows leave the live indices.
    /// Protected titles are decrypted when a live token is given.
    pub(crate) fn apply_row(&mut self, row: EntityRow, token: Option<&SessionToken>) {
        if row.is_deleted() {
            self.remove_entity(row.entity_name(), row.entity_id());
            return;
        }
        match row {
            EntityRow::Note(row) => {
                let mut note = Note::from_row(row);
                unseal_title(&mut note.title, token, &note.note_id);
                self.upsert_note(note);
            }
            EntityRow::Branch(branch) => self.upsert_branch(branch),
            EntityRow::Attribute(attribute) => self.upsert_attribute(attribute),
            EntityRow::Revision(row) => {
                let mut revision = Revision::from_row(row);
                unseal_title(&mut revision.title, token, &revision.revision_id);
                self.upsert_revision(revision);
            }
            EntityRow::Attachment(row) => {
                let mut attachment = Attachment::from_row(row);
                unseal_title(&mut attachment.title, token, &attachment.attachment_id);
                self.upsert_attachment(attachment);
            }
            EntityRow::Option(option) => self.upsert_option(option),
            EntityRow::Blob(_) => {}
        }
    }

    /// Decrypt every locked title. Returns how many were decrypted.
    pub(crate) fn unseal_all(&mut self, token: &SessionToken) -> usize {
        let mut count = 0;
        for note in self.notes.values_mut().filter(|n| n.is_locked()) {
            let note = Arc::make_mut(note);
            count += usize::from(unseal_title(&mut note.title, Some(token), &note.note_id));
        }
        for revision in self.revisions.values_mut().filter(|r| r.is_locked()) {
            let revision = Arc::make_mut(revision);
            count += usize::from(unseal_title(
                &mut revision.title,
                Some(token),
                &revision.revision_id,
            ));
        }
        for attachment in self.attachments.values_mut().filter(|a| a.is_locked()) {
            let attachment = Arc::make_mut(attachment);
            count += usize::from(unseal_title(
                &mut attachment.title,
                Some(token),
                &attachment.attachment_id,
            ));
        }
        count
    }

    /// Drop every decrypted title. Returns how many were scrubbed.
    pub(crate) fn scrub_all(&mut self) -> usize {
        let mut count = 0;
        for note in self.notes.values_mut() {
            if note.is_protected() && !note.is_locked() {
                count += usize::from(Arc::make_mut(note).title.scrub());
            }
        }
        for revision in self.revisions.values_mut() {
            if revision.is_protected() && !revision.is_locked() {
                count += usize::from(Arc::make_mut(revision).title.scrub());
            }
        }
        for attachment in self.attachments.values_mut() {
            if attachment.is_protected() && !attachment.is_locked() {
                count += usize::from(Arc::make_mut(attachment).title.scrub());
            }
        }
        count
    }
}

fn remove_id(index: &mut HashMap<String, Vec<String>>, key: &str, id: &str) {
    if let Some(ids) = index.get_mut(key) {
        ids.retain(|existing| existing != id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

fn unseal_title(
    title: &mut crate::protected::Protected<String>,
    token: Option<&SessionToken>,
    entity_id: &str,
) -> bool {
    let Some(token) = token else {
        return false;
    };
    match title.unseal_with(token) {
        Ok(unsealed) => unsealed,
        Err(e) => {
            warn!(entity_id, error = %e, "Could not decrypt protected title");
            false
        }
    }
}
