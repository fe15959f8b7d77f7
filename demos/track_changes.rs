//! Track Changes Example
//!
//! This example shows suggestion mode on a single document: insertions are
//! marked, deletions become proposals, and a reviewer accepts or rejects
//! them.
//!
//! Run with: cargo run --example track_changes

use redline_sdk::prelude::*;

fn print_changes(doc: &Document) {
    let changes = doc.tracked_changes();
    if changes.is_empty() {
        println!("  (no tracked changes)");
    }
    for change in changes {
        println!(
            "  [{}] {:?} at {}..{} by {}",
            change.kind,
            change.text,
            change.position,
            change.end(),
            change.author_name
        );
    }
}

fn main() {
    println!("=== Track Changes Example ===\n");

    let author = Author::new("ann", "Ann").with_color("#E91E63");
    let mut doc = Document::with_text(
        "contract.txt",
        "replica-ann",
        author,
        true,
        "The supplier shall deliver the goods within 30 days.",
    );
    println!("Original: {}\n", doc.content());

    // Typing is applied, then marked as a proposal.
    doc.dispatch(EditTransaction::single(EditChange::insert(44, "thirty ")));
    println!("After typing 'thirty ':");
    println!("  {}", doc.content());
    print_changes(&doc);

    // Backspace over "30 " is blocked and turned into a deletion proposal.
    doc.set_selection(TextSelection::caret(54));
    let verdict = doc.dispatch(EditTransaction::single(EditChange::delete(51, 54)));
    println!("\nAfter backspacing over '30 ' ({:?}):", verdict.map(|v| v.is_redirect()));
    println!("  {}", doc.content());
    print_changes(&doc);

    println!("\nDecorations:");
    for decoration in doc.decorations() {
        println!("  {}..{} {:?}: {}", decoration.from, decoration.to, decoration.kind, decoration.tooltip);
    }

    // Deleting your own proposal simply removes it.
    doc.dispatch(EditTransaction::single(EditChange::delete(44, 51)));
    println!("\nAfter deleting the proposed 'thirty ':");
    println!("  {}", doc.content());
    print_changes(&doc);

    // Undo brings it back, mark included.
    doc.undo();
    println!("\nAfter undo:");
    println!("  {}", doc.content());
    print_changes(&doc);

    let accepted = doc.accept_all();
    println!("\nAccepted {} change(s):", accepted);
    println!("  {}", doc.content());
    print_changes(&doc);

    println!("\n=== Demo Complete ===");
}
