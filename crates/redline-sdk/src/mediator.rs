//! Transaction mediator: decides, for each local edit, whether it may reach
//! the shared text as-is or must be turned into a deletion proposal.
//!
//! The mediator only classifies. Applying the edit, and scheduling the
//! attribute mutations that follow it, is the document's job.

use redline_text::{RGAText, TextError};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A local selection in character positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSelection {
    pub anchor: usize,
    pub head: usize,
}

impl TextSelection {
    pub fn new(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    pub fn caret(position: usize) -> Self {
        Self::new(position, position)
    }

    pub fn is_caret(&self) -> bool {
        self.anchor == self.head
    }

    pub fn from(&self) -> usize {
        self.anchor.min(self.head)
    }

    pub fn to(&self) -> usize {
        self.anchor.max(self.head)
    }

    /// Pull both ends inside a text of `len` characters.
    pub fn clamp(self, len: usize) -> Self {
        Self::new(self.anchor.min(len), self.head.min(len))
    }
}

/// One replaced range of an edit, in pre-edit coordinates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditChange {
    pub from: usize,
    pub to: usize,
    pub inserted: String,
}

impl EditChange {
    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self {
            from: at,
            to: at,
            inserted: text.into(),
        }
    }

    pub fn delete(from: usize, to: usize) -> Self {
        Self {
            from,
            to,
            inserted: String::new(),
        }
    }

    pub fn replace(from: usize, to: usize, text: impl Into<String>) -> Self {
        Self {
            from,
            to,
            inserted: text.into(),
        }
    }

    pub fn is_insertion(&self) -> bool {
        self.from == self.to && !self.inserted.is_empty()
    }

    pub fn is_deletion(&self) -> bool {
        self.to > self.from && self.inserted.is_empty()
    }

    pub fn is_noop(&self) -> bool {
        self.from == self.to && self.inserted.is_empty()
    }

    pub fn range(&self) -> Range<usize> {
        self.from..self.to
    }
}

/// A local edit as the editing surface reports it. Several changes mean a
/// multi-cursor edit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditTransaction {
    pub changes: Vec<EditChange>,
    /// Selection the surface wants after the edit.
    pub selection: Option<TextSelection>,
}

impl EditTransaction {
    pub fn new(changes: Vec<EditChange>) -> Self {
        Self {
            changes,
            selection: None,
        }
    }

    pub fn single(change: EditChange) -> Self {
        Self::new(vec![change])
    }

    pub fn with_selection(mut self, selection: TextSelection) -> Self {
        self.selection = Some(selection);
        self
    }

    /// Check every change against a text of `len` characters.
    pub fn validate(&self, len: usize) -> Result<(), TextError> {
        for change in &self.changes {
            if change.from > change.to || change.to > len {
                return Err(TextError::RangeOutOfBounds {
                    start: change.from,
                    end: change.to,
                    length: len,
                });
            }
        }
        Ok(())
    }
}

/// Direction of a deletion gesture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gesture {
    /// Backspace: the caret sat at the end of the range.
    Backward,
    /// Forward delete: the caret sat at the start of the range.
    Forward,
}

impl Gesture {
    /// Infer the gesture from where the selection head was before the edit.
    pub fn infer(range: &Range<usize>, head: Option<usize>) -> Self {
        if head == Some(range.start) {
            Gesture::Forward
        } else {
            Gesture::Backward
        }
    }
}

/// Mediator state, observable between and during transactions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediatorState {
    Observe,
    Classify,
    PassThrough,
    Redirect,
}

/// Why an edit was let through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassReason {
    /// Nothing to apply.
    Empty,
    /// Tracking is off.
    Untracked,
    /// Pure insertion; the new text gets its mark in the deferred pass.
    Insertion,
    /// Deleting nothing but proposed text rejects the proposal.
    ProposalRemoval,
    /// Replace or typeover, applied untracked.
    Mixed,
}

/// Outcome of classifying one transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    PassThrough(PassReason),
    /// Block the deletion and mark `ranges` as proposed deletions instead.
    Redirect {
        ranges: Vec<Range<usize>>,
        gesture: Gesture,
        /// Where the local caret goes after the blocked edit.
        selection: TextSelection,
    },
}

impl Verdict {
    pub fn is_redirect(&self) -> bool {
        matches!(self, Verdict::Redirect { .. })
    }

    /// True if inserted text must be marked after the edit lands.
    pub fn marks_insertions(&self) -> bool {
        matches!(self, Verdict::PassThrough(PassReason::Insertion))
    }
}

/// Classifies local transactions. One per document.
#[derive(Clone, Debug)]
pub struct Mediator {
    state: MediatorState,
    tracking: bool,
}

impl Mediator {
    pub fn new(tracking: bool) -> Self {
        Self {
            state: MediatorState::Observe,
            tracking,
        }
    }

    pub fn state(&self) -> MediatorState {
        self.state
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn set_tracking(&mut self, tracking: bool) {
        self.tracking = tracking;
    }

    /// Classify a transaction against the text it is about to modify.
    /// `selection` is the local selection before the edit.
    pub fn classify(
        &mut self,
        tx: &EditTransaction,
        text: &RGAText,
        selection: Option<TextSelection>,
    ) -> Verdict {
        self.state = MediatorState::Classify;
        let verdict = self.decide(tx, text, selection);
        self.state = if verdict.is_redirect() {
            MediatorState::Redirect
        } else {
            MediatorState::PassThrough
        };
        tracing::debug!(?verdict, changes = tx.changes.len(), "classified local transaction");
        verdict
    }

    /// Return to observing once the document has acted on the verdict.
    pub fn settle(&mut self) {
        self.state = MediatorState::Observe;
    }

    fn decide(
        &self,
        tx: &EditTransaction,
        text: &RGAText,
        selection: Option<TextSelection>,
    ) -> Verdict {
        let changes: Vec<&EditChange> = tx.changes.iter().filter(|c| !c.is_noop()).collect();
        if changes.is_empty() {
            return Verdict::PassThrough(PassReason::Empty);
        }
        if !self.tracking {
            return Verdict::PassThrough(PassReason::Untracked);
        }
        if changes.iter().all(|c| c.is_insertion()) {
            return Verdict::PassThrough(PassReason::Insertion);
        }
        if !changes.iter().all(|c| c.is_deletion()) {
            return Verdict::PassThrough(PassReason::Mixed);
        }

        let only_proposals = changes.iter().all(|c| {
            text.slice_runs(c.from, c.to)
                .iter()
                .all(|run| run.attrs.track_insert().is_some())
        });
        if only_proposals {
            return Verdict::PassThrough(PassReason::ProposalRemoval);
        }

        let mut ranges: Vec<Range<usize>> = changes.iter().map(|c| c.range()).collect();
        ranges.sort_by_key(|r| r.start);

        let head = selection.map(|s| s.head);
        let primary = ranges
            .iter()
            .find(|r| head == Some(r.start) || head == Some(r.end))
            .or_else(|| ranges.first())
            .cloned()
            .unwrap_or_default();
        let gesture = Gesture::infer(&primary, head);
        let caret = match gesture {
            Gesture::Backward => primary.start,
            Gesture::Forward => primary.end,
        };

        Verdict::Redirect {
            ranges,
            gesture,
            selection: TextSelection::caret(caret),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redline_text::{Attributes, Attribution};

    fn text_with(plain: &str, proposed: &str) -> RGAText {
        let mut text = RGAText::new("r1");
        text.insert(0, plain).unwrap();
        text.insert_with(
            plain.chars().count(),
            proposed,
            &Attributes::tracked_insert(Attribution::new("u1", "Ann", 1)),
        )
        .unwrap();
        text
    }

    #[test]
    fn test_untracked_passes_everything() {
        let text = text_with("hello", "");
        let mut mediator = Mediator::new(false);
        let tx = EditTransaction::single(EditChange::delete(0, 2));
        assert_eq!(
            mediator.classify(&tx, &text, None),
            Verdict::PassThrough(PassReason::Untracked)
        );
        assert_eq!(mediator.state(), MediatorState::PassThrough);
        mediator.settle();
        assert_eq!(mediator.state(), MediatorState::Observe);
    }

    #[test]
    fn test_insertion_passes_and_is_marked() {
        let text = text_with("hello", "");
        let mut mediator = Mediator::new(true);
        let verdict = mediator.classify(&EditTransaction::single(EditChange::insert(5, "!")), &text, None);
        assert!(verdict.marks_insertions());
    }

    #[test]
    fn test_deleting_proposal_passes() {
        let text = text_with("hello", " world");
        let mut mediator = Mediator::new(true);
        let tx = EditTransaction::single(EditChange::delete(6, 11));
        assert_eq!(
            mediator.classify(&tx, &text, None),
            Verdict::PassThrough(PassReason::ProposalRemoval)
        );
    }

    #[test]
    fn test_backspace_is_redirected_backward() {
        let text = text_with("The quick fox", "");
        let mut mediator = Mediator::new(true);
        let tx = EditTransaction::single(EditChange::delete(9, 10));

        let verdict = mediator.classify(&tx, &text, Some(TextSelection::caret(10)));
        assert_eq!(
            verdict,
            Verdict::Redirect {
                ranges: vec![9..10],
                gesture: Gesture::Backward,
                selection: TextSelection::caret(9),
            }
        );
        assert_eq!(mediator.state(), MediatorState::Redirect);
    }

    #[test]
    fn test_forward_delete_moves_caret_after_range() {
        let text = text_with("The quick fox", "");
        let mut mediator = Mediator::new(true);
        let tx = EditTransaction::single(EditChange::delete(4, 9));

        match mediator.classify(&tx, &text, Some(TextSelection::caret(4))) {
            Verdict::Redirect {
                gesture, selection, ..
            } => {
                assert_eq!(gesture, Gesture::Forward);
                assert_eq!(selection, TextSelection::caret(9));
            }
            other => panic!("expected redirect, got {:?}", other),
        }
    }

    #[test]
    fn test_partially_proposed_range_is_redirected() {
        let text = text_with("abc", "def");
        let mut mediator = Mediator::new(true);
        let tx = EditTransaction::single(EditChange::delete(2, 4));
        assert!(mediator.classify(&tx, &text, None).is_redirect());
    }

    #[test]
    fn test_replace_is_mixed() {
        let text = text_with("abc", "");
        let mut mediator = Mediator::new(true);
        let tx = EditTransaction::single(EditChange::replace(0, 1, "z"));
        assert_eq!(
            mediator.classify(&tx, &text, None),
            Verdict::PassThrough(PassReason::Mixed)
        );

        let multi = EditTransaction::new(vec![EditChange::insert(0, "x"), EditChange::delete(1, 2)]);
        assert_eq!(
            mediator.classify(&multi, &text, None),
            Verdict::PassThrough(PassReason::Mixed)
        );
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let tx = EditTransaction::single(EditChange::delete(2, 9));
        assert!(tx.validate(5).is_err());
        assert!(EditTransaction::single(EditChange::insert(5, "x")).validate(5).is_ok());
    }
}
