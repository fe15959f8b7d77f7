//! Undo/Redo System - per-document undo of local edits.
//!
//! Provides:
//! - Local-only recording (remote and replayed changes never enter the stacks)
//! - Grouping: every transaction is one batch, and follow-up changes can be
//!   attached to the batch that caused them
//! - Inverse generation from the recorded [`TextChange`]s
//!
//! One manager belongs to exactly one document; stacks are never shared.

use crate::delta::{Origin, TextChange};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use ulid::Ulid;

/// Unique identifier for an undo batch.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(String);

impl GroupId {
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

/// The changes of one local transaction, undone and redone together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoBatch {
    pub id: GroupId,
    pub changes: Vec<TextChange>,
}

/// An undo manager for a single document.
#[derive(Clone, Debug)]
pub struct UndoManager {
    document_id: String,
    undo_stack: VecDeque<UndoBatch>,
    redo_stack: VecDeque<UndoBatch>,
    /// Maximum number of batches kept on the undo stack.
    max_history: usize,
}

impl UndoManager {
    /// Create a new undo manager.
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history: 1000,
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Set the maximum history size.
    pub fn set_max_history(&mut self, max: usize) {
        self.max_history = max;
        self.trim_history();
    }

    /// Record the changes of one transaction as a new batch.
    ///
    /// Only local transactions are recorded; anything else returns `None`.
    /// A new batch clears the redo stack.
    pub fn record(&mut self, origin: Origin, changes: Vec<TextChange>) -> Option<GroupId> {
        if origin != Origin::Local || changes.is_empty() {
            return None;
        }
        let id = GroupId::new();
        self.undo_stack.push_back(UndoBatch {
            id: id.clone(),
            changes,
        });
        self.redo_stack.clear();
        self.trim_history();
        Some(id)
    }

    /// Append changes to an existing batch still on the undo stack.
    /// Returns false if that batch is gone (undone or trimmed).
    pub fn record_into(&mut self, group: &GroupId, changes: Vec<TextChange>) -> bool {
        match self.undo_stack.iter_mut().rev().find(|b| &b.id == group) {
            Some(batch) => {
                batch.changes.extend(changes);
                true
            }
            None => false,
        }
    }

    /// Check if we can undo.
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Check if we can redo.
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Undo the last batch.
    /// Returns the inverse changes in application order.
    pub fn undo(&mut self) -> Vec<TextChange> {
        let Some(batch) = self.undo_stack.pop_back() else {
            return Vec::new();
        };
        let inverses = batch
            .changes
            .iter()
            .rev()
            .flat_map(TextChange::inverse)
            .collect();
        self.redo_stack.push_back(batch);
        inverses
    }

    /// Redo the last undone batch.
    /// Returns the changes to reapply.
    pub fn redo(&mut self) -> Vec<TextChange> {
        let Some(batch) = self.redo_stack.pop_back() else {
            return Vec::new();
        };
        let changes = batch.changes.clone();
        self.undo_stack.push_back(batch);
        changes
    }

    /// Get the undo stack size.
    pub fn undo_stack_size(&self) -> usize {
        self.undo_stack.len()
    }

    /// Get the redo stack size.
    pub fn redo_stack_size(&self) -> usize {
        self.redo_stack.len()
    }

    /// Clear all history.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    fn trim_history(&mut self) {
        while self.undo_stack.len() > self.max_history {
            self.undo_stack.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::Attributes;
    use crate::rga_text::RGAText;

    fn replay(text: &mut RGAText, changes: &[TextChange]) {
        text.with_origin(Origin::Replay, |t| {
            for change in changes {
                t.apply_change(change).unwrap();
            }
        });
    }

    fn changes_of(text: &mut RGAText) -> Vec<TextChange> {
        text.take_events().into_iter().map(|e| e.change).collect()
    }

    #[test]
    fn test_basic_undo() {
        let mut text = RGAText::new("r1");
        let mut undo = UndoManager::new("doc1");

        text.insert(0, "Hello").unwrap();
        undo.record(Origin::Local, changes_of(&mut text));
        text.insert(5, " World").unwrap();
        undo.record(Origin::Local, changes_of(&mut text));

        assert!(undo.can_undo());
        assert!(!undo.can_redo());

        let inverses = undo.undo();
        replay(&mut text, &inverses);
        assert_eq!(text.to_string(), "Hello");
        assert!(undo.can_redo());
    }

    #[test]
    fn test_redo() {
        let mut text = RGAText::new("r1");
        let mut undo = UndoManager::new("doc1");

        text.insert(0, "abc").unwrap();
        undo.record(Origin::Local, changes_of(&mut text));
        text.delete(1, 1).unwrap();
        undo.record(Origin::Local, changes_of(&mut text));

        replay(&mut text, &undo.undo());
        assert_eq!(text.to_string(), "abc");

        replay(&mut text, &undo.redo());
        assert_eq!(text.to_string(), "ac");
        assert!(!undo.can_redo());
        assert_eq!(undo.undo_stack_size(), 2);
    }

    #[test]
    fn test_non_local_origins_ignored() {
        let mut undo = UndoManager::new("doc1");
        let change = TextChange::Inserted {
            position: 0,
            text: "x".into(),
            attrs: Attributes::new(),
        };
        assert!(undo.record(Origin::Remote, vec![change.clone()]).is_none());
        assert!(undo.record(Origin::Replay, vec![change]).is_none());
        assert!(!undo.can_undo());
    }

    #[test]
    fn test_record_into_joins_batch() {
        let mut text = RGAText::new("r1");
        let mut undo = UndoManager::new("doc1");

        text.insert(0, "typed").unwrap();
        let group = undo.record(Origin::Local, changes_of(&mut text)).unwrap();
        text.format(0, 5, &crate::attrs::mark_insert(crate::attrs::Attribution::new("u", "U", 1)))
            .unwrap();
        assert!(undo.record_into(&group, changes_of(&mut text)));
        assert_eq!(undo.undo_stack_size(), 1);

        replay(&mut text, &undo.undo());
        assert_eq!(text.to_string(), "");
        assert!(!undo.record_into(&group, Vec::new()));
    }

    #[test]
    fn test_redo_clears_on_new_operation() {
        let mut text = RGAText::new("r1");
        let mut undo = UndoManager::new("doc1");

        text.insert(0, "a").unwrap();
        undo.record(Origin::Local, changes_of(&mut text));
        replay(&mut text, &undo.undo());
        assert!(undo.can_redo());

        text.insert(0, "b").unwrap();
        undo.record(Origin::Local, changes_of(&mut text));
        assert!(!undo.can_redo());
    }

    #[test]
    fn test_max_history() {
        let mut undo = UndoManager::new("doc1");
        undo.set_max_history(5);

        for i in 0..10 {
            let change = TextChange::Inserted {
                position: i,
                text: "x".into(),
                attrs: Attributes::new(),
            };
            undo.record(Origin::Local, vec![change]);
        }
        assert_eq!(undo.undo_stack_size(), 5);
    }
}
