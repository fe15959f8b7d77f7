//! Two sessions talking over the in-memory transport.

use redline_sdk::client::quick::create_collaborative_clients_with;
use redline_sdk::prelude::*;
use redline_sdk::{MemoryTransport, SyncConfigBuilder};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

type Shared = Arc<Session<MemoryTransport>>;

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

fn content(session: &Shared) -> String {
    session
        .document("doc")
        .map(|d| d.read().content())
        .unwrap_or_default()
}

/// Alice owns a seeded document, Bob joins with an empty one.
async fn pair(seed: &str, sync: SyncConfig) -> (Shared, Shared) {
    let clients = create_collaborative_clients_with(&["Alice", "Bob"], sync);
    let alice = clients[0].create_session("review");
    let bob = clients[1].create_session("review");
    alice.spawn_receiver().unwrap();
    bob.spawn_receiver().unwrap();

    alice.open_document_with_text("doc", seed);
    bob.open_document("doc");
    assert_ok!(bob.connect().await);

    let expected = seed.to_string();
    assert!(eventually(|| content(&bob) == expected).await);
    (alice, bob)
}

fn quiet() -> SyncConfig {
    SyncConfigBuilder::new().watchdog(false).build()
}

#[tokio::test]
async fn test_join_receives_existing_text() {
    let (alice, bob) = pair("Hello", quiet()).await;
    assert_eq!(content(&alice), "Hello");
    assert!(eventually(|| bob.synced_peers("doc").len() == 1).await);
}

#[tokio::test]
async fn test_tracked_insert_reaches_peer_with_attribution() {
    let (alice, bob) = pair("Hello", quiet()).await;

    alice
        .edit("doc", EditTransaction::single(EditChange::insert(5, " world")))
        .await
        .unwrap();

    let doc = bob.document("doc").unwrap();
    assert!(eventually(|| doc.read().tracked_changes().len() == 1).await);

    let change = doc.read().tracked_changes()[0].clone();
    assert_eq!(change.kind, ChangeKind::Insert);
    assert_eq!(change.text, " world");
    assert_eq!(change.author_name, "Alice");
    assert_eq!(change.author_id, "alice");
    assert!(!doc.read().can_undo());
}

#[tokio::test]
async fn test_peer_rejects_proposed_deletion() {
    let (alice, bob) = pair("Hello", quiet()).await;

    bob.set_selection("doc", TextSelection::caret(5)).await.unwrap();
    let verdict = bob
        .edit("doc", EditTransaction::single(EditChange::delete(4, 5)))
        .await
        .unwrap();
    assert!(verdict.map(|v| v.is_redirect()).unwrap_or(false));
    assert_eq!(content(&bob), "Hello");

    let alice_doc = alice.document("doc").unwrap();
    assert!(eventually(|| alice_doc.read().tracked_changes().len() == 1).await);
    let change = alice_doc.read().tracked_changes()[0].clone();
    assert_eq!(change.kind, ChangeKind::Delete);
    assert_eq!(change.author_name, "Bob");

    assert!(alice.reject_change("doc", &change.id).await.unwrap());
    let bob_doc = bob.document("doc").unwrap();
    assert!(eventually(|| bob_doc.read().tracked_changes().is_empty()).await);
    assert_eq!(content(&bob), "Hello");
}

#[tokio::test]
async fn test_accept_deletion_removes_text_everywhere() {
    let (alice, bob) = pair("Hello world", quiet()).await;

    alice
        .edit("doc", EditTransaction::single(EditChange::delete(5, 11)))
        .await
        .unwrap();
    let bob_doc = bob.document("doc").unwrap();
    assert!(eventually(|| bob_doc.read().tracked_changes().len() == 1).await);

    assert_eq!(bob.accept_all("doc").await.unwrap(), 1);
    assert!(eventually(|| content(&alice) == "Hello").await);
    assert!(alice.document("doc").unwrap().read().tracked_changes().is_empty());
}

#[tokio::test]
async fn test_undo_only_touches_own_changes() {
    let (alice, bob) = pair("Hello", quiet()).await;

    alice
        .edit("doc", EditTransaction::single(EditChange::insert(0, "A")))
        .await
        .unwrap();
    assert!(eventually(|| content(&bob) == "AHello").await);

    bob.edit("doc", EditTransaction::single(EditChange::insert(6, "B")))
        .await
        .unwrap();
    assert!(eventually(|| content(&alice) == "AHelloB").await);

    assert!(bob.undo("doc").await.unwrap());
    assert!(!bob.undo("doc").await.unwrap());
    assert!(eventually(|| content(&alice) == "AHello").await);

    let alice_doc = alice.document("doc").unwrap();
    assert!(alice_doc.read().can_undo());
    let changes = alice_doc.read().tracked_changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].author_name, "Alice");
}

#[tokio::test]
async fn test_peer_selection_is_shared() {
    let (alice, bob) = pair("Hello world", quiet()).await;

    alice
        .set_selection("doc", TextSelection::new(1, 4))
        .await
        .unwrap();

    let awareness = bob.awareness().clone();
    assert!(eventually(|| awareness.peer_selections("doc").len() == 1).await);
    let selection = awareness.peer_selections("doc")[0].clone();
    assert_eq!(selection.display_name, "Alice");
    assert_eq!(selection.range(), (1, 4));
    assert!(alice.awareness().peer_selections("doc").is_empty());

    alice.disconnect().await.unwrap();
    assert!(eventually(|| awareness.peer_selections("doc").is_empty()).await);
}

#[tokio::test]
async fn test_typing_moves_caret_for_peers() {
    let (alice, bob) = pair("Hello", quiet()).await;

    alice
        .edit(
            "doc",
            EditTransaction::single(EditChange::insert(5, "!"))
                .with_selection(TextSelection::caret(6)),
        )
        .await
        .unwrap();

    let awareness = bob.awareness().clone();
    assert!(eventually(|| {
        awareness
            .peer_selections("doc")
            .iter()
            .any(|s| s.display_name == "Alice" && s.range() == (6, 6))
    })
    .await);
}

#[tokio::test]
async fn test_undo_history_is_per_document() {
    let clients = create_collaborative_clients_with(&["Alice"], quiet());
    let session = clients[0].create_session("drafts");
    let a = session.open_document_with_text("a", "Alpha");
    let b = session.open_document_with_text("b", "Beta");

    session
        .edit("a", EditTransaction::single(EditChange::insert(5, "!")))
        .await
        .unwrap();
    assert!(a.read().can_undo());
    assert!(!b.read().can_undo());
    assert!(!session.undo("b").await.unwrap());
    assert_eq!(a.read().content(), "Alpha!");

    session
        .edit("b", EditTransaction::single(EditChange::insert(4, "?")))
        .await
        .unwrap();
    assert!(session.undo("a").await.unwrap());
    assert_eq!(a.read().content(), "Alpha");
    assert_eq!(b.read().content(), "Beta?");
    assert!(b.read().can_undo());
}

#[tokio::test]
async fn test_independent_seeds_are_deduplicated() {
    let seed = "Both sides seeded this paragraph.";
    let sync = SyncConfigBuilder::new()
        .watchdog_delay(20)
        .duplication_threshold(10)
        .build();
    let clients = create_collaborative_clients_with(&["Alice", "Bob"], sync);
    let alice = clients[0].create_session("review");
    let bob = clients[1].create_session("review");
    alice.spawn_receiver().unwrap();
    bob.spawn_receiver().unwrap();

    alice.open_document_with_text("doc", seed);
    bob.open_document_with_text("doc", seed);
    bob.connect().await.unwrap();

    assert!(eventually(|| !alice.synced_peers("doc").is_empty()).await);
    assert!(eventually(|| !bob.synced_peers("doc").is_empty()).await);
    assert!(eventually(|| content(&alice) == seed && content(&bob) == seed).await);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(content(&alice), seed);
    assert_eq!(content(&bob), seed);
}

#[tokio::test]
async fn test_closed_document_ignores_updates() {
    let (alice, bob) = pair("Hello", quiet()).await;
    let bob_doc = bob.document("doc").unwrap();
    bob.close_document("doc");

    alice
        .edit("doc", EditTransaction::single(EditChange::insert(5, "!")))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(bob_doc.read().content(), "Hello");
    assert!(!bob_doc.read().is_live());
    assert_err!(bob.undo("doc").await);
}
