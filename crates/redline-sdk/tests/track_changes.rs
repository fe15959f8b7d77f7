//! Editing scenarios on a single document handle.

use redline_sdk::prelude::*;
use redline_sdk::{DecorationKind, PassReason};

fn seeded(user: &str, content: &str) -> Document {
    Document::with_text("doc", user, Author::new(user, user.to_uppercase()), true, content)
}

fn fork(doc: &Document, user: &str) -> Document {
    let state = doc.encode_state().unwrap();
    Document::from_snapshot("doc", user, Author::new(user, user.to_uppercase()), true, &state)
        .unwrap()
}

#[test]
fn multi_cursor_deletion_marks_every_range() {
    let mut doc = seeded("ann", "one two three");
    let tx = EditTransaction::new(vec![EditChange::delete(8, 13), EditChange::delete(0, 3)]);

    let verdict = doc.dispatch(tx).unwrap();
    match verdict {
        Verdict::Redirect { ranges, .. } => assert_eq!(ranges, vec![0..3, 8..13]),
        other => panic!("expected redirect, got {:?}", other),
    }
    assert_eq!(doc.content(), "one two three");

    let changes = doc.tracked_changes();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].text, "one");
    assert_eq!(changes[1].text, "three");
    assert!(changes.iter().all(|c| c.kind == ChangeKind::Delete));
}

#[test]
fn deleting_across_a_proposal_converts_it() {
    let mut ann = seeded("ann", "abc");
    ann.dispatch(EditTransaction::single(EditChange::insert(3, "def")));

    let mut bob = fork(&ann, "bob");
    bob.dispatch(EditTransaction::single(EditChange::delete(2, 4)));

    let changes = bob.tracked_changes();
    assert_eq!(changes.len(), 2);
    assert_eq!(
        (changes[0].kind, changes[0].text.as_str(), changes[0].author_id.as_str()),
        (ChangeKind::Delete, "cd", "bob")
    );
    assert_eq!(
        (changes[1].kind, changes[1].text.as_str(), changes[1].author_id.as_str()),
        (ChangeKind::Insert, "ef", "ann")
    );

    // Undoing the redirect restores the original proposal.
    assert!(bob.undo());
    let changes = bob.tracked_changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].text, "def");
    assert_eq!(changes[0].author_id, "ann");
}

#[test]
fn typeover_is_applied_untracked() {
    let mut doc = seeded("ann", "colour");
    let verdict = doc.dispatch(EditTransaction::single(EditChange::replace(3, 5, "o")));

    assert_eq!(verdict, Some(Verdict::PassThrough(PassReason::Mixed)));
    assert_eq!(doc.content(), "color");
    assert!(doc.tracked_changes().is_empty());
}

#[test]
fn decorations_follow_tracked_changes() {
    let mut doc = seeded("ann", "Hello");
    doc.dispatch(EditTransaction::single(EditChange::insert(5, " world")));
    doc.set_selection(TextSelection::caret(0));
    doc.dispatch(EditTransaction::single(EditChange::delete(0, 1)));

    let decorations = doc.decorations();
    assert_eq!(decorations.len(), 2);
    assert_eq!(decorations[0].kind, DecorationKind::TrackedDelete);
    assert_eq!((decorations[0].from, decorations[0].to), (0, 1));
    assert_eq!(decorations[1].kind, DecorationKind::TrackedInsert);
    assert_eq!((decorations[1].from, decorations[1].to), (5, 11));
    assert!(decorations[1].tooltip.starts_with("Inserted by ANN on "));

    let summary = doc.review_summary();
    assert_eq!((summary.insertions, summary.deletions), (1, 1));
    assert_eq!(summary.authors, vec!["ANN".to_string()]);
}

#[test]
fn forward_delete_moves_caret_past_range() {
    let mut doc = seeded("ann", "abcdef");
    doc.set_selection(TextSelection::caret(2));
    doc.dispatch(EditTransaction::single(EditChange::delete(2, 4)));

    assert_eq!(doc.selection(), Some(TextSelection::caret(4)));
    assert_eq!(doc.content(), "abcdef");
}

#[test]
fn events_report_tracked_changes_after_marks() {
    let mut doc = seeded("ann", "Hi");
    let mut events = doc.subscribe();
    doc.dispatch(EditTransaction::single(EditChange::insert(2, "!")));

    let mut last_tracked = None;
    while let Ok(event) = events.try_recv() {
        if let DocEvent::TrackedChanges(changes) = event {
            last_tracked = Some(changes);
        }
    }
    let changes = last_tracked.unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].text, "!");
}

#[test]
fn review_actions_replicate() {
    let mut ann = seeded("ann", "draft");
    ann.dispatch(EditTransaction::single(EditChange::insert(5, " two")));
    let mut bob = fork(&ann, "bob");
    ann.take_outbound().unwrap();

    assert_eq!(bob.accept_all(), 1);
    let update = bob.take_outbound().unwrap().unwrap();
    ann.apply_remote(&update).unwrap();

    assert_eq!(ann.content(), "draft two");
    assert!(ann.tracked_changes().is_empty());
}
