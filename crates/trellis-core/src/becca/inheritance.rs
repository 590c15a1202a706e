//! Attribute inheritance
//!
//! A note sees, in this order and each attribute once:
//!
//! 1. its own attributes
//! 2. inheritable attributes of its branch ancestors, closest first, each ancestor
//!    followed by the inheritable attributes of the notes it templates from
//! 3. for each of its own template relations, the target's own attributes (without the
//!    target's template relations) and the inheritable attributes of the target's
//!    ancestors
//!
//! Templates are followed one hop only. Lookups by name take the first match, so the
//! closest owner wins and branch inheritance beats template inheritance.

use std::collections::HashSet;
use std::sync::Arc;

use super::BeccaSnapshot;
use crate::entities::{Attribute, AttributeType, Note};

/// Relation names that pull in the target note's attributes
pub const INHERITANCE_RELATIONS: [&str; 3] = ["template", "inherit", "instance"];

pub fn is_inheritance_relation(attribute: &Attribute) -> bool {
    attribute.is_relation() && INHERITANCE_RELATIONS.contains(&attribute.name.as_str())
}

struct Collector<'a> {
    name: Option<&'a str>,
    seen: HashSet<String>,
    out: Vec<Arc<Attribute>>,
}

impl Collector<'_> {
    fn push(&mut self, attribute: &Arc<Attribute>) {
        if self.name.is_some_and(|name| name != attribute.name) {
            return;
        }
        if self.seen.insert(attribute.attribute_id.clone()) {
            self.out.push(Arc::clone(attribute));
        }
    }
}

impl BeccaSnapshot {
    /// Notes `note_id` inherits from through template relations
    pub fn template_targets(&self, note_id: &str) -> Vec<String> {
        self.own_attributes(note_id)
            .iter()
            .filter(|a| is_inheritance_relation(a))
            .map(|a| a.value.clone())
            .filter(|target| target != note_id && self.has_note(target))
            .collect()
    }

    /// All attributes visible to the note, optionally only those named `name`
    pub fn inherited_attributes(&self, note_id: &str, name: Option<&str>) -> Vec<Arc<Attribute>> {
        let mut collector = Collector {
            name,
            seen: HashSet::new(),
            out: Vec::new(),
        };
        if !self.has_note(note_id) {
            return collector.out;
        }

        for attribute in self.own_attributes(note_id) {
            collector.push(&attribute);
        }

        for ancestor in self.ancestors(note_id) {
            for attribute in self.own_attributes(&ancestor) {
                if attribute.is_inheritable {
                    collector.push(&attribute);
                }
            }
            for target in self.template_targets(&ancestor) {
                for attribute in self.own_attributes(&target) {
                    if attribute.is_inheritable {
                        collector.push(&attribute);
                    }
                }
            }
        }

        let mut visited_targets: HashSet<String> = HashSet::from([note_id.to_string()]);
        for target in self.template_targets(note_id) {
            if !visited_targets.insert(target.clone()) {
                continue;
            }
            for attribute in self.own_attributes(&target) {
                if !is_inheritance_relation(&attribute) {
                    collector.push(&attribute);
                }
            }
            for ancestor in self.ancestors(&target) {
                for attribute in self.own_attributes(&ancestor) {
                    if attribute.is_inheritable {
                        collector.push(&attribute);
                    }
                }
            }
        }

        collector.out
    }

    fn first_visible(
        &self,
        note_id: &str,
        attribute_type: AttributeType,
        name: &str,
    ) -> Option<Arc<Attribute>> {
        self.inherited_attributes(note_id, Some(name))
            .into_iter()
            .find(|a| a.attribute_type == attribute_type)
    }

    /// Value of the closest visible label
    pub fn label_value(&self, note_id: &str, name: &str) -> Option<String> {
        self.first_visible(note_id, AttributeType::Label, name)
            .map(|a| a.value.clone())
    }

    /// Target of the closest visible relation
    pub fn relation_target(&self, note_id: &str, name: &str) -> Option<Arc<Note>> {
        self.first_visible(note_id, AttributeType::Relation, name)
            .and_then(|a| self.note(&a.value))
    }

    pub fn has_label(&self, note_id: &str, name: &str) -> bool {
        self.first_visible(note_id, AttributeType::Label, name)
            .is_some()
    }

    /// Every live attribute of one type and name, in creation order
    pub fn find_attributes(&self, attribute_type: AttributeType, name: &str) -> Vec<Arc<Attribute>> {
        self.attrs_by_name
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(|id| self.attributes.get(id))
            .filter(|a| a.attribute_type == attribute_type)
            .cloned()
            .collect()
    }

    /// Notes owning a label `name`, optionally with the given value
    pub fn notes_with_label(&self, name: &str, value: Option<&str>) -> Vec<Arc<Note>> {
        let mut seen = HashSet::new();
        self.find_attributes(AttributeType::Label, name)
            .into_iter()
            .filter(|a| value.is_none_or(|v| a.value == v))
            .filter(|a| seen.insert(a.note_id.clone()))
            .filter_map(|a| self.note(&a.note_id))
            .collect()
    }
}
