//! Network transport abstractions for replicating documents and awareness.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use redline_text::{PresenceUpdate, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Unique identifier for a peer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Peer connection state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerState {
    Disconnected,
    Connecting,
    Connected,
}

/// Information about a connected peer.
#[derive(Clone, Debug)]
pub struct Peer {
    pub id: PeerId,
    pub name: String,
    pub state: PeerState,
}

/// Messages exchanged between peers.
///
/// Document payloads are encoded `TextUpdate`s. Applying one is idempotent,
/// so a full state may be sent wherever a delta would do.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Message {
    /// Hello/handshake message.
    Hello {
        replica_id: String,
        user_name: String,
    },
    /// Ask a peer for its state of a document, offering ours.
    SyncRequest { document_id: String, state: Vec<u8> },
    /// Answer to a sync request with the full state.
    SyncResponse { document_id: String, state: Vec<u8> },
    /// Incremental update.
    Update {
        document_id: String,
        update: Vec<u8>,
    },
    /// Awareness (peer selections) update.
    Awareness { update: PresenceUpdate },
    /// The sender's session is leaving.
    Goodbye { session_id: SessionId },
    /// Ping for keepalive.
    Ping,
    /// Pong response.
    Pong,
}

impl Message {
    /// Document the message concerns, if any.
    pub fn document_id(&self) -> Option<&str> {
        match self {
            Message::SyncRequest { document_id, .. }
            | Message::SyncResponse { document_id, .. }
            | Message::Update { document_id, .. } => Some(document_id),
            _ => None,
        }
    }
}

/// Network error type.
#[derive(Clone, Debug)]
pub enum NetworkError {
    ConnectionFailed(String),
    PeerNotFound(String),
    SendFailed(String),
    /// The incoming stream was already taken.
    AlreadySubscribed,
    Disconnected,
}

impl std::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkError::ConnectionFailed(e) => write!(f, "Connection failed: {}", e),
            NetworkError::PeerNotFound(id) => write!(f, "Peer not found: {}", id),
            NetworkError::SendFailed(e) => write!(f, "Send failed: {}", e),
            NetworkError::AlreadySubscribed => write!(f, "Incoming messages already subscribed"),
            NetworkError::Disconnected => write!(f, "Disconnected"),
        }
    }
}

impl std::error::Error for NetworkError {}

/// Abstract network transport trait.
#[async_trait]
pub trait NetworkTransport: Send + Sync + 'static {
    /// Connect to a peer.
    async fn connect(&self, peer_id: &PeerId) -> Result<(), NetworkError>;

    /// Disconnect from a peer.
    async fn disconnect(&self, peer_id: &PeerId) -> Result<(), NetworkError>;

    /// Send a message to a specific peer.
    async fn send(&self, peer_id: &PeerId, message: Message) -> Result<(), NetworkError>;

    /// Broadcast a message to all connected peers.
    async fn broadcast(&self, message: Message) -> Result<(), NetworkError>;

    /// Get list of connected peers.
    async fn connected_peers(&self) -> Vec<Peer>;

    /// Take the stream of incoming messages. Only the first call gets it.
    fn subscribe(&self) -> Option<mpsc::Receiver<(PeerId, Message)>>;
}

type Envelope = (PeerId, Message);

/// A wired link to another in-memory transport.
struct Route {
    peer: Peer,
    mailbox: mpsc::Sender<Envelope>,
}

/// In-memory transport for tests, demos and simulations.
///
/// Transports are wired pairwise with [`MemoryTransport::connect_to`].
/// Disconnecting keeps the wire, so a later `connect` resumes delivery.
pub struct MemoryTransport {
    local_id: PeerId,
    mailbox: mpsc::Sender<Envelope>,
    inbox: Mutex<Option<mpsc::Receiver<Envelope>>>,
    routes: RwLock<HashMap<PeerId, Route>>,
}

impl MemoryTransport {
    pub fn new(local_id: PeerId) -> Self {
        Self::with_capacity(local_id, 100)
    }

    /// `capacity` bounds the inbox; senders wait when it is full.
    pub fn with_capacity(local_id: PeerId, capacity: usize) -> Self {
        let (mailbox, inbox) = mpsc::channel(capacity.max(1));
        Self {
            local_id,
            mailbox,
            inbox: Mutex::new(Some(inbox)),
            routes: RwLock::new(HashMap::new()),
        }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    /// Wire two transports to each other, both sides connected.
    pub fn connect_to(&self, other: &MemoryTransport) {
        self.add_route(&other.local_id, other.mailbox.clone());
        other.add_route(&self.local_id, self.mailbox.clone());
    }

    fn add_route(&self, peer_id: &PeerId, mailbox: mpsc::Sender<Envelope>) {
        let peer = Peer {
            id: peer_id.clone(),
            name: peer_id.0.clone(),
            state: PeerState::Connected,
        };
        self.routes
            .write()
            .insert(peer_id.clone(), Route { peer, mailbox });
    }

    fn set_state(&self, peer_id: &PeerId, state: PeerState) -> Result<(), NetworkError> {
        match self.routes.write().get_mut(peer_id) {
            Some(route) => {
                route.peer.state = state;
                Ok(())
            }
            None => Err(NetworkError::PeerNotFound(peer_id.to_string())),
        }
    }

    /// Mailboxes of the connected peers.
    fn open_mailboxes(&self) -> Vec<mpsc::Sender<Envelope>> {
        self.routes
            .read()
            .values()
            .filter(|r| r.peer.state == PeerState::Connected)
            .map(|r| r.mailbox.clone())
            .collect()
    }
}

#[async_trait]
impl NetworkTransport for MemoryTransport {
    async fn connect(&self, peer_id: &PeerId) -> Result<(), NetworkError> {
        self.set_state(peer_id, PeerState::Connected)
            .map_err(|_| NetworkError::ConnectionFailed(format!("no route to {}", peer_id)))
    }

    async fn disconnect(&self, peer_id: &PeerId) -> Result<(), NetworkError> {
        self.set_state(peer_id, PeerState::Disconnected)
    }

    async fn send(&self, peer_id: &PeerId, message: Message) -> Result<(), NetworkError> {
        let mailbox = match self.routes.read().get(peer_id) {
            Some(route) if route.peer.state == PeerState::Connected => route.mailbox.clone(),
            Some(_) => return Err(NetworkError::Disconnected),
            None => return Err(NetworkError::PeerNotFound(peer_id.to_string())),
        };

        mailbox
            .send((self.local_id.clone(), message))
            .await
            .map_err(|e| NetworkError::SendFailed(e.to_string()))
    }

    async fn broadcast(&self, message: Message) -> Result<(), NetworkError> {
        for mailbox in self.open_mailboxes() {
            if mailbox
                .send((self.local_id.clone(), message.clone()))
                .await
                .is_err()
            {
                tracing::debug!(peer = %self.local_id, "dropping message for closed peer");
            }
        }
        Ok(())
    }

    async fn connected_peers(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self
            .routes
            .read()
            .values()
            .filter(|r| r.peer.state == PeerState::Connected)
            .map(|r| r.peer.clone())
            .collect();
        peers.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        peers
    }

    fn subscribe(&self) -> Option<mpsc::Receiver<Envelope>> {
        self.inbox.lock().take()
    }
}

/// Create `count` memory transports wired to each other.
pub fn create_network(count: usize) -> Vec<MemoryTransport> {
    create_network_with_capacity(count, 100)
}

pub fn create_network_with_capacity(count: usize, capacity: usize) -> Vec<MemoryTransport> {
    let transports: Vec<_> = (0..count)
        .map(|i| MemoryTransport::with_capacity(PeerId::new(format!("peer-{}", i)), capacity))
        .collect();

    for (i, left) in transports.iter().enumerate() {
        for right in &transports[i + 1..] {
            left.connect_to(right);
        }
    }
    transports
}
