//! Review Session Example
//!
//! Two collaborators share a document over the in-memory network. The
//! author suggests edits, the reviewer sees them arrive and decides.
//!
//! Run with: cargo run --example review_session

use redline_sdk::client::quick::create_collaborative_clients;
use redline_sdk::prelude::*;
use std::time::Duration;

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::main]
async fn main() -> Result<(), SdkError> {
    println!("=== Review Session Example ===\n");

    let clients = create_collaborative_clients(&["Alice", "Bob"]);
    let alice = clients[0].create_session("review");
    let bob = clients[1].create_session("review");
    alice.spawn_receiver()?;
    bob.spawn_receiver()?;

    alice.open_document_with_text("draft.md", "Meeting moved to Friday at noon.");
    bob.open_document("draft.md");
    bob.connect().await?;
    settle().await;

    println!("Bob joined and sees: {}", bob.document("draft.md")?.read().content());

    // Alice suggests a change.
    alice
        .edit("draft.md", EditTransaction::single(EditChange::insert(31, " sharp")))
        .await?;
    alice
        .set_selection("draft.md", TextSelection::caret(17))
        .await?;
    alice
        .edit("draft.md", EditTransaction::single(EditChange::delete(17, 24)))
        .await?;
    settle().await;

    let bob_doc = bob.document("draft.md")?;
    println!("\nBob's view of the proposals:");
    for change in bob_doc.read().tracked_changes() {
        println!("  {} {:?} by {} [{}]", change.kind, change.text, change.author_name, change.id);
    }

    // Bob accepts the insertion and rejects the deletion.
    let changes = bob_doc.read().tracked_changes();
    for change in changes {
        match change.kind {
            ChangeKind::Insert => bob.accept_change("draft.md", &change.id).await?,
            ChangeKind::Delete => bob.reject_change("draft.md", &change.id).await?,
        };
    }
    settle().await;

    println!("\nAfter review:");
    println!("  Alice: {}", alice.document("draft.md")?.read().content());
    println!("  Bob:   {}", bob_doc.read().content());
    println!("  Open changes: {}", bob_doc.read().tracked_changes().len());

    bob.disconnect().await?;
    println!("\n=== Demo Complete ===");
    Ok(())
}
