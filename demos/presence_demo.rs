//! Presence and Awareness Example
//!
//! This example shows how peer selections travel between sessions and how
//! they are rendered as carets and highlights.
//!
//! Run with: cargo run --example presence_demo

use redline_sdk::client::quick::create_collaborative_clients;
use redline_sdk::prelude::*;
use redline_sdk::SelectionMark;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), SdkError> {
    println!("=== Presence and Awareness Demo ===\n");

    let clients = create_collaborative_clients(&["Alice", "Bob", "Charlie"]);
    let sessions: Vec<_> = clients.iter().map(|c| c.create_session("doc-session")).collect();
    for session in &sessions {
        session.spawn_receiver()?;
        println!("  - {} (color: {})", session.author().name, session.awareness().local_color());
    }

    sessions[0].open_document_with_text("notes.txt", "Shared notes for the quarterly plan.");
    for session in &sessions[1..] {
        session.open_document("notes.txt");
        session.connect().await?;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    println!("\nAlice places a caret, Bob selects a word, Charlie selects backwards.");
    sessions[0].set_selection("notes.txt", TextSelection::caret(0)).await?;
    sessions[1].set_selection("notes.txt", TextSelection::new(7, 12)).await?;
    sessions[2].set_selection("notes.txt", TextSelection::new(35, 27)).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    for session in &sessions {
        let doc = session.document("notes.txt")?;
        let len = doc.read().len();
        println!("\n--- {}'s view ---", session.author().name);
        for mark in session.awareness().marks("notes.txt", len) {
            match mark {
                SelectionMark::Caret { position, color, name } => {
                    println!("  caret  {:>3} {} ({})", position, name, color)
                }
                SelectionMark::Highlight { from, to, color } => {
                    println!("  range  {:>3}..{:<3} ({})", from, to, color)
                }
            }
        }
    }

    println!("\nCharlie leaves.");
    sessions[2].disconnect().await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!(
        "Alice now sees {} peer selection(s).",
        sessions[0].awareness().peer_selections("notes.txt").len()
    );

    println!("\n=== Demo Complete ===");
    Ok(())
}
