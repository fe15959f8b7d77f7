//! Session management: the open documents of one editor session, and the
//! message loop that keeps them in sync with peers.

use crate::document::{Author, DocEvent, Document};
use crate::error::{Result, SdkError};
use crate::mediator::{EditTransaction, TextSelection, Verdict};
use crate::network::{Message, NetworkError, NetworkTransport, Peer, PeerId};
use crate::presence::Awareness;
use crate::sync::{SyncConfig, SyncEvent, SyncTracker};
use crate::watchdog::DuplicationWatchdog;
use parking_lot::RwLock;
use redline_text::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Events emitted by a session.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// A peer joined the session.
    PeerJoined { peer_id: PeerId, user_name: String },
    /// A peer left the session.
    PeerLeft { peer_id: PeerId },
    /// A document was opened.
    DocumentOpened { document_id: String },
    /// A document was closed.
    DocumentClosed { document_id: String },
    /// Replication progress.
    Sync(SyncEvent),
    /// Session connected.
    Connected,
    /// Session disconnected.
    Disconnected,
}

type SharedDocuments = Arc<RwLock<HashMap<String, Arc<RwLock<Document>>>>>;

/// A collaborative session that manages documents and peers.
///
/// Each session is its own replica: the session id doubles as the replica
/// id of every document it opens.
pub struct Session<T: NetworkTransport> {
    name: String,
    session_id: SessionId,
    local_peer_id: PeerId,
    author: Author,
    track_changes: bool,
    config: SyncConfig,
    transport: Arc<T>,
    awareness: Arc<Awareness>,
    documents: SharedDocuments,
    watchdogs: Arc<RwLock<HashMap<String, DuplicationWatchdog>>>,
    tracker: Arc<RwLock<SyncTracker>>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl<T: NetworkTransport> Session<T> {
    /// Create a new session.
    pub fn new(
        name: impl Into<String>,
        local_peer_id: PeerId,
        author: Author,
        track_changes: bool,
        transport: Arc<T>,
        config: SyncConfig,
    ) -> Self {
        let session_id = SessionId::new();
        let (event_tx, _) = broadcast::channel(config.channel_capacity.max(1));

        let awareness = Awareness::new(
            session_id.clone(),
            author.id.clone(),
            author.name.clone(),
            author.color.clone(),
        );
        awareness.set_stale_timeout(config.presence_timeout_ms);

        Self {
            name: name.into(),
            session_id,
            local_peer_id,
            author,
            track_changes,
            config,
            transport,
            awareness: Arc::new(awareness),
            documents: Arc::new(RwLock::new(HashMap::new())),
            watchdogs: Arc::new(RwLock::new(HashMap::new())),
            tracker: Arc::new(RwLock::new(SyncTracker::new())),
            event_tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn local_peer_id(&self) -> &PeerId {
        &self.local_peer_id
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn awareness(&self) -> &Arc<Awareness> {
        &self.awareness
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    // === Documents ===

    /// Open an empty document, or return the one already open.
    pub fn open_document(&self, document_id: impl Into<String>) -> Arc<RwLock<Document>> {
        let document_id = document_id.into();
        let replica = self.session_id.to_string();
        self.open_with(document_id, |id| {
            Document::new(id, replica, self.author.clone(), self.track_changes)
        })
    }

    /// Open a document seeded with `content`, or return the one already open.
    pub fn open_document_with_text(
        &self,
        document_id: impl Into<String>,
        content: &str,
    ) -> Arc<RwLock<Document>> {
        let document_id = document_id.into();
        let replica = self.session_id.to_string();
        self.open_with(document_id, |id| {
            Document::with_text(id, replica, self.author.clone(), self.track_changes, content)
        })
    }

    /// Open a document from a snapshot made with `encode_state`.
    pub fn open_document_from_snapshot(
        &self,
        document_id: impl Into<String>,
        snapshot: &[u8],
    ) -> Result<Arc<RwLock<Document>>> {
        let document_id = document_id.into();
        let doc = Document::from_snapshot(
            document_id.clone(),
            self.session_id.to_string(),
            self.author.clone(),
            self.track_changes,
            snapshot,
        )?;
        Ok(self.open_with(document_id, |_| doc))
    }

    fn open_with(
        &self,
        document_id: String,
        create: impl FnOnce(String) -> Document,
    ) -> Arc<RwLock<Document>> {
        let mut docs = self.documents.write();
        if let Some(doc) = docs.get(&document_id) {
            return doc.clone();
        }

        let doc = Arc::new(RwLock::new(create(document_id.clone())));
        docs.insert(document_id.clone(), doc.clone());
        drop(docs);

        tracing::debug!(session = %self.session_id, document = %document_id, "document opened");
        self.emit(SessionEvent::DocumentOpened { document_id });
        doc
    }

    /// Get an open document.
    pub fn document(&self, document_id: &str) -> Result<Arc<RwLock<Document>>> {
        self.documents
            .read()
            .get(document_id)
            .cloned()
            .ok_or_else(|| SdkError::DocumentNotFound(document_id.to_string()))
    }

    /// Close a document. Its watchdog is cancelled and pending deferred
    /// mutations are dropped.
    pub fn close_document(&self, document_id: &str) {
        let removed = self.documents.write().remove(document_id);
        self.watchdogs.write().remove(document_id);
        if let Some(doc) = removed {
            doc.write().close();
            self.awareness.clear_selection(document_id);
            self.tracker.write().forget_document(document_id);
            self.emit(SessionEvent::DocumentClosed {
                document_id: document_id.to_string(),
            });
        }
    }

    /// Get list of open document IDs.
    pub fn open_documents(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.documents.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Subscribe to one document's events.
    pub fn subscribe_document(&self, document_id: &str) -> Result<broadcast::Receiver<DocEvent>> {
        Ok(self.document(document_id)?.read().subscribe())
    }

    // === Local editing ===

    /// Run one local edit: the synchronous cycle, a scheduler turn, then
    /// the deferred mutations. Ops are broadcast after each step.
    pub async fn edit(&self, document_id: &str, tx: EditTransaction) -> Result<Option<Verdict>> {
        let doc = self.document(document_id)?;
        let moves_selection = tx.selection.is_some();
        let verdict = doc.write().transact(tx);
        self.publish(document_id, &doc).await?;

        let redirected = matches!(verdict, Some(Verdict::Redirect { .. }));
        if redirected || (verdict.is_some() && moves_selection) {
            let selection = doc.read().selection();
            if let Some(selection) = selection {
                self.share_selection(document_id, selection).await?;
            }
        }

        tokio::task::yield_now().await;

        let applied = doc.write().run_deferred();
        if applied > 0 {
            self.publish(document_id, &doc).await?;
        }
        Ok(verdict)
    }

    /// Move the local selection and tell peers.
    pub async fn set_selection(&self, document_id: &str, selection: TextSelection) -> Result<()> {
        let doc = self.document(document_id)?;
        doc.write().set_selection(selection);
        let clamped = doc.read().selection().unwrap_or(selection);
        self.share_selection(document_id, clamped).await
    }

    async fn share_selection(&self, document_id: &str, selection: TextSelection) -> Result<()> {
        self.awareness
            .set_selection(document_id, selection.anchor, selection.head);
        self.broadcast_awareness().await
    }

    /// Ship pending awareness changes to peers.
    pub async fn broadcast_awareness(&self) -> Result<()> {
        if let Some(update) = self.awareness.take_update() {
            self.transport.broadcast(Message::Awareness { update }).await?;
        }
        Ok(())
    }

    /// Re-announce the local selection so peers keep it visible.
    pub async fn heartbeat(&self) -> Result<()> {
        self.awareness.heartbeat();
        self.broadcast_awareness().await
    }

    pub async fn accept_change(&self, document_id: &str, change_id: &str) -> Result<bool> {
        self.with_document(document_id, |doc| doc.accept_change(change_id))
            .await
    }

    pub async fn reject_change(&self, document_id: &str, change_id: &str) -> Result<bool> {
        self.with_document(document_id, |doc| doc.reject_change(change_id))
            .await
    }

    pub async fn accept_all(&self, document_id: &str) -> Result<usize> {
        self.with_document(document_id, Document::accept_all).await
    }

    pub async fn reject_all(&self, document_id: &str) -> Result<usize> {
        self.with_document(document_id, Document::reject_all).await
    }

    pub async fn undo(&self, document_id: &str) -> Result<bool> {
        self.with_document(document_id, Document::undo).await
    }

    pub async fn redo(&self, document_id: &str) -> Result<bool> {
        self.with_document(document_id, Document::redo).await
    }

    async fn with_document<R>(
        &self,
        document_id: &str,
        f: impl FnOnce(&mut Document) -> R,
    ) -> Result<R> {
        let doc = self.document(document_id)?;
        let result = f(&mut doc.write());
        self.publish(document_id, &doc).await?;
        Ok(result)
    }

    /// Broadcast whatever ops the document produced since the last call.
    async fn publish(&self, document_id: &str, doc: &Arc<RwLock<Document>>) -> Result<()> {
        let outbound = doc.write().take_outbound()?;
        let Some(update) = outbound else {
            return Ok(());
        };

        let bytes = update.len();
        self.transport
            .broadcast(Message::Update {
                document_id: document_id.to_string(),
                update,
            })
            .await?;
        self.emit(SessionEvent::Sync(SyncEvent::SentUpdate {
            document_id: document_id.to_string(),
            bytes,
        }));
        Ok(())
    }

    // === Peers ===

    /// Announce this session to peers and ask them for every open document.
    pub async fn connect(&self) -> Result<()> {
        let message = Message::Hello {
            replica_id: self.session_id.to_string(),
            user_name: self.author.name.clone(),
        };
        self.transport
            .broadcast(message)
            .await
            .map_err(|e| SdkError::ConnectionFailed(e.to_string()))?;

        for document_id in self.open_documents() {
            self.request_sync(&document_id).await?;
        }
        self.heartbeat().await?;

        self.emit(SessionEvent::Connected);
        Ok(())
    }

    /// Offer our state of a document to every peer and ask for theirs.
    pub async fn request_sync(&self, document_id: &str) -> Result<()> {
        let state = self.document(document_id)?.read().encode_state()?;
        self.transport
            .broadcast(Message::SyncRequest {
                document_id: document_id.to_string(),
                state,
            })
            .await?;
        Ok(())
    }

    /// Leave: tell peers, drop presence and close every document.
    pub async fn disconnect(&self) -> Result<()> {
        self.awareness.leave();
        self.broadcast_awareness().await?;
        self.transport
            .broadcast(Message::Goodbye {
                session_id: self.session_id.clone(),
            })
            .await?;

        for document_id in self.open_documents() {
            self.close_document(&document_id);
        }
        self.emit(SessionEvent::Disconnected);
        Ok(())
    }

    /// Get connected peers.
    pub async fn peers(&self) -> Vec<Peer> {
        self.transport.connected_peers().await
    }

    /// Peers that have exchanged full state of a document with us.
    pub fn synced_peers(&self, document_id: &str) -> Vec<PeerId> {
        self.tracker.read().peers_synced(document_id)
    }

    /// Forget peers whose presence went quiet.
    pub fn cleanup_stale(&self) -> usize {
        self.awareness.cleanup_stale().len()
    }

    // === Incoming ===

    /// Handle one message from a peer.
    pub async fn handle_message(&self, from: PeerId, message: Message) -> Result<()> {
        self.tracker.write().touch(&from);

        match message {
            Message::Hello {
                replica_id,
                user_name,
            } => {
                tracing::info!(peer = %from, replica = %replica_id, user = %user_name, "peer joined");
                self.emit(SessionEvent::PeerJoined {
                    peer_id: from.clone(),
                    user_name,
                });
                for document_id in self.open_documents() {
                    let state = self.document(&document_id)?.read().encode_state()?;
                    self.transport
                        .send(&from, Message::SyncRequest { document_id, state })
                        .await?;
                }
                self.awareness.heartbeat();
                self.broadcast_awareness().await?;
            }
            Message::SyncRequest { document_id, state } => {
                let Ok(doc) = self.document(&document_id) else {
                    tracing::debug!(peer = %from, document = %document_id, "sync request for closed document");
                    return Ok(());
                };
                doc.write().apply_remote(&state)?;
                let ours = doc.read().encode_state()?;
                self.transport
                    .send(
                        &from,
                        Message::SyncResponse {
                            document_id: document_id.clone(),
                            state: ours,
                        },
                    )
                    .await?;
                self.after_sync(&from, &document_id, &doc);
            }
            Message::SyncResponse { document_id, state } => {
                let Ok(doc) = self.document(&document_id) else {
                    return Ok(());
                };
                doc.write().apply_remote(&state)?;
                self.after_sync(&from, &document_id, &doc);
            }
            Message::Update {
                document_id,
                update,
            } => {
                let Ok(doc) = self.document(&document_id) else {
                    return Ok(());
                };
                doc.write().apply_remote(&update)?;
                self.emit(SessionEvent::Sync(SyncEvent::ReceivedUpdate {
                    peer_id: from,
                    document_id,
                }));
            }
            Message::Awareness { update } => {
                self.awareness.apply_update(&update);
            }
            Message::Goodbye { session_id } => {
                self.awareness.remove_session(&session_id);
                self.tracker.write().forget_peer(&from);
                tracing::info!(peer = %from, "peer left");
                self.emit(SessionEvent::PeerLeft { peer_id: from });
            }
            Message::Ping => {
                self.transport.send(&from, Message::Pong).await?;
            }
            Message::Pong => {}
        }
        Ok(())
    }

    fn after_sync(&self, from: &PeerId, document_id: &str, doc: &Arc<RwLock<Document>>) {
        self.tracker.write().record_sync(from, document_id);
        self.emit(SessionEvent::Sync(SyncEvent::SyncCompleted {
            peer_id: from.clone(),
            document_id: document_id.to_string(),
        }));

        let first = doc.write().mark_synced();
        if first && self.config.watchdog {
            let watchdog = DuplicationWatchdog::spawn(
                doc.clone(),
                self.transport.clone(),
                Duration::from_millis(self.config.watchdog_delay_ms),
                self.config.duplication_threshold,
            );
            self.watchdogs
                .write()
                .insert(document_id.to_string(), watchdog);
        }
    }

    /// Start the message loop. Only one session per transport can receive.
    pub fn spawn_receiver(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        let mut rx = self
            .transport
            .subscribe()
            .ok_or(SdkError::from(NetworkError::AlreadySubscribed))?;
        let session = Arc::clone(self);

        Ok(tokio::spawn(async move {
            while let Some((from, message)) = rx.recv().await {
                if let Err(e) = session.handle_message(from.clone(), message).await {
                    tracing::warn!(peer = %from, error = %e, "failed to handle message");
                    session.emit(SessionEvent::Sync(SyncEvent::SyncError {
                        peer_id: from,
                        error: e.to_string(),
                    }));
                }
            }
            tracing::debug!(session = %session.session_id, "message loop ended");
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mediator::EditChange;
    use crate::network::MemoryTransport;

    fn session(name: &str) -> Session<MemoryTransport> {
        let peer_id = PeerId::new(format!("peer-{}", name));
        let transport = Arc::new(MemoryTransport::new(peer_id.clone()));
        Session::new(
            "session-1",
            peer_id,
            Author::new(name, name.to_uppercase()),
            true,
            transport,
            SyncConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_session_creation() {
        let session = session("alice");
        assert_eq!(session.name(), "session-1");
        assert_eq!(session.author().name, "ALICE");
        assert!(session.open_documents().is_empty());
    }

    #[tokio::test]
    async fn test_document_management() {
        let session = session("alice");

        let first = session.open_document("doc-1");
        let again = session.open_document("doc-1");
        assert!(Arc::ptr_eq(&first, &again));
        session.open_document_with_text("doc-2", "seed");
        assert_eq!(session.open_documents(), vec!["doc-1", "doc-2"]);

        session.close_document("doc-1");
        assert_eq!(session.open_documents(), vec!["doc-2"]);
        assert!(!first.read().is_live());
        assert!(matches!(
            session.document("doc-1"),
            Err(SdkError::DocumentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_edit_runs_deferred_marks() {
        let session = session("alice");
        session.open_document_with_text("doc", "Hello");

        session
            .edit("doc", EditTransaction::single(EditChange::insert(5, "!")))
            .await
            .unwrap();

        let doc = session.document("doc").unwrap();
        assert_eq!(doc.read().content(), "Hello!");
        assert_eq!(doc.read().tracked_changes().len(), 1);
        assert_eq!(doc.read().pending_mutations(), 0);
    }

    #[tokio::test]
    async fn test_edit_unknown_document() {
        let session = session("alice");
        let result = session
            .edit("missing", EditTransaction::single(EditChange::insert(0, "x")))
            .await;
        assert!(matches!(result, Err(SdkError::DocumentNotFound(_))));
    }

    #[tokio::test]
    async fn test_receiver_can_only_start_once() {
        let session = Arc::new(session("alice"));
        let handle = session.spawn_receiver().unwrap();
        assert!(session.spawn_receiver().is_err());
        handle.abort();
    }
}
