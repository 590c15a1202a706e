//! Placement-graph queries
//!
//! Every walk keeps a visited set, so a transient cycle in the branch data cannot make
//! a query loop.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use super::BeccaSnapshot;
use crate::entities::{Branch, Note};
use crate::utils::ROOT_NOTE_ID;

impl BeccaSnapshot {
    /// Branches under `note_id`, in sibling order
    pub fn child_branches(&self, note_id: &str) -> Vec<Arc<Branch>> {
        self.resolve_branches(self.children.get(note_id))
    }

    /// Branches placing `note_id`, by position
    pub fn parent_branches(&self, note_id: &str) -> Vec<Arc<Branch>> {
        self.resolve_branches(self.parents.get(note_id))
    }

    pub fn child_notes(&self, note_id: &str) -> Vec<Arc<Note>> {
        self.child_branches(note_id)
            .iter()
            .filter_map(|b| self.note(&b.note_id))
            .collect()
    }

    pub fn parent_notes(&self, note_id: &str) -> Vec<Arc<Note>> {
        self.parent_branches(note_id)
            .iter()
            .filter_map(|b| self.note(&b.parent_note_id))
            .collect()
    }

    fn parent_ids(&self, note_id: &str) -> impl Iterator<Item = &str> {
        self.parents
            .get(note_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.branches.get(id))
            .map(|b| b.parent_note_id.as_str())
    }

    fn resolve_branches(&self, ids: Option<&Vec<String>>) -> Vec<Arc<Branch>> {
        ids.map(|ids| ids.iter().filter_map(|id| self.branch(id)).collect())
            .unwrap_or_default()
    }

    /// Path of note ids from `hoisted_note_id` down to `note_id`
    ///
    /// Breadth-first upward walk, visiting parents in branch order, so the result is the
    /// shortest path and ties go to the lowest-positioned branch. `None` when the note
    /// is not reachable from the hoisted note.
    pub fn note_path(&self, note_id: &str, hoisted_note_id: &str) -> Option<Vec<String>> {
        if !self.has_note(note_id) {
            return None;
        }
        if note_id == hoisted_note_id {
            return Some(vec![note_id.to_string()]);
        }

        // parent -> the child it was reached from
        let mut reached_from: HashMap<&str, &str> = HashMap::new();
        let mut visited: HashSet<&str> = HashSet::from([note_id]);
        let mut queue: VecDeque<&str> = VecDeque::from([note_id]);

        while let Some(current) = queue.pop_front() {
            for parent in self.parent_ids(current) {
                if !visited.insert(parent) {
                    continue;
                }
                reached_from.insert(parent, current);
                if parent == hoisted_note_id {
                    let mut path = vec![parent.to_string()];
                    let mut step = parent;
                    while let Some(&child) = reached_from.get(step) {
                        path.push(child.to_string());
                        step = child;
                    }
                    return Some(path);
                }
                queue.push_back(parent);
            }
        }
        None
    }

    /// Every path from the root down to `note_id`, shortest first
    pub fn all_note_paths(&self, note_id: &str) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        if self.has_note(note_id) {
            let mut stack = vec![note_id.to_string()];
            self.collect_paths(&mut stack, &mut paths);
        }
        paths.sort_by_key(Vec::len);
        paths
    }

    fn collect_paths(&self, stack: &mut Vec<String>, paths: &mut Vec<Vec<String>>) {
        let Some(current) = stack.last().cloned() else {
            return;
        };
        if current == ROOT_NOTE_ID {
            paths.push(stack.iter().rev().cloned().collect());
            return;
        }
        let parents: Vec<String> = self.parent_ids(&current).map(str::to_string).collect();
        for parent in parents {
            if stack.contains(&parent) {
                continue;
            }
            stack.push(parent);
            self.collect_paths(stack, paths);
            stack.pop();
        }
    }

    /// Ancestors of `note_id`, closest first, each once. The note itself is excluded.
    pub fn ancestors(&self, note_id: &str) -> Vec<String> {
        let mut visited: HashSet<&str> = HashSet::from([note_id]);
        let mut queue: VecDeque<&str> = VecDeque::from([note_id]);
        let mut ancestors = Vec::new();

        while let Some(current) = queue.pop_front() {
            for parent in self.parent_ids(current) {
                if visited.insert(parent) {
                    ancestors.push(parent.to_string());
                    queue.push_back(parent);
                }
            }
        }
        ancestors
    }

    pub fn is_ancestor(&self, ancestor_id: &str, note_id: &str) -> bool {
        let mut visited: HashSet<&str> = HashSet::from([note_id]);
        let mut queue: VecDeque<&str> = VecDeque::from([note_id]);

        while let Some(current) = queue.pop_front() {
            for parent in self.parent_ids(current) {
                if parent == ancestor_id {
                    return true;
                }
                if visited.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        false
    }

    /// `note_id` and all its descendants, breadth first
    pub fn subtree_note_ids(&self, note_id: &str) -> Vec<String> {
        if !self.has_note(note_id) {
            return Vec::new();
        }
        let mut visited: HashSet<String> = HashSet::from([note_id.to_string()]);
        let mut queue = VecDeque::from([note_id.to_string()]);
        let mut subtree = Vec::new();

        while let Some(current) = queue.pop_front() {
            for branch in self.child_branches(&current) {
                if visited.insert(branch.note_id.clone()) {
                    queue.push_back(branch.note_id.clone());
                }
            }
            subtree.push(current);
        }
        subtree
    }
}
