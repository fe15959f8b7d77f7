//! High-level client for the Redline SDK.

use crate::document::Author;
use crate::error::SdkError;
use crate::network::{MemoryTransport, NetworkTransport, Peer, PeerId};
use crate::session::Session;
use crate::sync::SyncConfig;
use parking_lot::RwLock;
use redline_text::CursorColors;
use std::collections::HashMap;
use std::sync::Arc;
use ulid::Ulid;

/// Configuration for the Redline client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Stable user id, stamped on tracked changes.
    pub user_id: String,
    /// User name for presence and change attribution.
    pub user_name: String,
    /// Cursor and change color. Picked from the palette when unset.
    pub color: Option<String>,
    /// Whether new documents start with track changes on.
    pub track_changes: bool,
    pub sync: SyncConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_id: "anonymous".to_string(),
            user_name: "Anonymous".to_string(),
            color: None,
            track_changes: true,
            sync: SyncConfig::default(),
        }
    }
}

impl ClientConfig {
    /// The author every session of this client writes as.
    pub fn author(&self) -> Author {
        let color = self
            .color
            .clone()
            .unwrap_or_else(|| CursorColors::color_for_user(&self.user_id).to_string());
        Author::new(&self.user_id, &self.user_name).with_color(color)
    }
}

/// Builder for client configuration.
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn user_id(mut self, id: impl Into<String>) -> Self {
        self.config.user_id = id.into();
        self
    }

    pub fn user_name(mut self, name: impl Into<String>) -> Self {
        self.config.user_name = name.into();
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.config.color = Some(color.into());
        self
    }

    pub fn track_changes(mut self, enabled: bool) -> Self {
        self.config.track_changes = enabled;
        self
    }

    pub fn sync(mut self, sync: SyncConfig) -> Self {
        self.config.sync = sync;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The main Redline client for collaborative editing.
///
/// The client manages sessions and the network connection they share.
///
/// # Example
///
/// ```rust
/// use redline_sdk::{Client, ClientConfig, EditChange, EditTransaction};
///
/// let config = ClientConfig {
///     user_id: "u1".to_string(),
///     user_name: "Alice".to_string(),
///     ..Default::default()
/// };
/// let client = Client::new_with_memory_transport(config);
///
/// let session = client.create_session("my-session");
/// let doc = session.open_document_with_text("contract", "Terms apply.");
///
/// // Tracking is on: the deletion becomes a proposal.
/// doc.write().dispatch(EditTransaction::single(EditChange::delete(0, 6)));
/// assert_eq!(doc.read().content(), "Terms apply.");
/// assert_eq!(doc.read().tracked_changes().len(), 1);
/// ```
pub struct Client<T: NetworkTransport> {
    peer_id: PeerId,
    config: ClientConfig,
    transport: Arc<T>,
    sessions: Arc<RwLock<HashMap<String, Arc<Session<T>>>>>,
}

impl Client<MemoryTransport> {
    /// Create a new client with an in-memory transport.
    pub fn new_with_memory_transport(config: ClientConfig) -> Self {
        let peer_id = PeerId::new(format!("peer-{}", Ulid::new()));
        let transport = Arc::new(MemoryTransport::with_capacity(
            peer_id.clone(),
            config.sync.channel_capacity,
        ));
        Self::new(peer_id, transport, config)
    }
}

impl<T: NetworkTransport> Client<T> {
    /// Create a new client with a custom transport.
    pub fn new(peer_id: PeerId, transport: Arc<T>, config: ClientConfig) -> Self {
        Self {
            peer_id,
            config,
            transport,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn user_name(&self) -> &str {
        &self.config.user_name
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Create a session, or return the one with this name.
    pub fn create_session(&self, name: impl Into<String>) -> Arc<Session<T>> {
        let name = name.into();
        let mut sessions = self.sessions.write();

        if let Some(session) = sessions.get(&name) {
            session.clone()
        } else {
            let session = Arc::new(Session::new(
                name.clone(),
                self.peer_id.clone(),
                self.config.author(),
                self.config.track_changes,
                self.transport.clone(),
                self.config.sync.clone(),
            ));
            sessions.insert(name, session.clone());
            session
        }
    }

    pub fn get_session(&self, name: &str) -> Option<Arc<Session<T>>> {
        self.sessions.read().get(name).cloned()
    }

    /// Drop a session. Its documents are closed.
    pub fn close_session(&self, name: &str) {
        let removed = self.sessions.write().remove(name);
        if let Some(session) = removed {
            for document_id in session.open_documents() {
                session.close_document(&document_id);
            }
        }
    }

    pub fn session_names(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    pub async fn connect_peer(&self, peer_id: &PeerId) -> Result<(), SdkError> {
        self.transport
            .connect(peer_id)
            .await
            .map_err(|e| SdkError::ConnectionFailed(e.to_string()))
    }

    pub async fn disconnect_peer(&self, peer_id: &PeerId) -> Result<(), SdkError> {
        self.transport
            .disconnect(peer_id)
            .await
            .map_err(|e| SdkError::NetworkError(e.to_string()))
    }

    pub async fn connected_peers(&self) -> Vec<Peer> {
        self.transport.connected_peers().await
    }
}

/// Convenience functions for quickly creating collaborative sessions.
pub mod quick {
    use super::*;
    use crate::network::create_network_with_capacity;

    /// Create fully connected clients, one per user name. User ids are the
    /// lowercased names.
    pub fn create_collaborative_clients(user_names: &[&str]) -> Vec<Client<MemoryTransport>> {
        create_collaborative_clients_with(user_names, SyncConfig::default())
    }

    pub fn create_collaborative_clients_with(
        user_names: &[&str],
        sync: SyncConfig,
    ) -> Vec<Client<MemoryTransport>> {
        let network = create_network_with_capacity(user_names.len(), sync.channel_capacity);

        user_names
            .iter()
            .zip(network)
            .map(|(name, transport)| {
                let peer_id = transport.local_id().clone();
                let config = ClientConfig {
                    user_id: name.to_lowercase(),
                    user_name: name.to_string(),
                    sync: sync.clone(),
                    ..Default::default()
                };
                Client::new(peer_id, Arc::new(transport), config)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = ClientConfig {
            user_name: "Alice".to_string(),
            ..Default::default()
        };
        let client = Client::new_with_memory_transport(config);

        assert_eq!(client.user_name(), "Alice");
        assert!(client.peer_id().0.starts_with("peer-"));
    }

    #[test]
    fn test_session_management() {
        let client = Client::new_with_memory_transport(ClientConfig::default());

        let session1 = client.create_session("session-1");
        let _session2 = client.create_session("session-2");
        assert_eq!(client.session_names().len(), 2);

        let session1_again = client.create_session("session-1");
        assert!(Arc::ptr_eq(&session1, &session1_again));
        assert_ne!(session1.session_id(), _session2.session_id());

        let doc = session1.open_document("doc");
        client.close_session("session-1");
        assert_eq!(client.session_names().len(), 1);
        assert!(!doc.read().is_live());
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfigBuilder::new()
            .user_id("bob")
            .user_name("Bob")
            .color("#00ff00")
            .track_changes(false)
            .build();

        assert_eq!(config.user_name, "Bob");
        assert!(!config.track_changes);
        assert_eq!(config.author().color.as_deref(), Some("#00ff00"));
    }

    #[test]
    fn test_author_color_from_palette() {
        let config = ClientConfigBuilder::new().user_id("carol").build();
        assert_eq!(
            config.author().color.as_deref(),
            Some(CursorColors::color_for_user("carol"))
        );
    }

    #[test]
    fn test_quick_collaborative_clients() {
        let clients = quick::create_collaborative_clients(&["Alice", "Bob", "Charlie"]);

        assert_eq!(clients.len(), 3);
        assert_eq!(clients[0].user_name(), "Alice");
        assert_eq!(clients[1].config().user_id, "bob");
        assert_eq!(clients[2].user_name(), "Charlie");
    }
}
