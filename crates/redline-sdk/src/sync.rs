//! Synchronization settings and per-peer bookkeeping.

use crate::network::PeerId;
use std::collections::HashMap;
use std::time::Instant;

/// Configuration for sync behavior.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Delay after initial sync before the duplication check runs (in milliseconds).
    pub watchdog_delay_ms: u64,
    /// Minimum text length, in characters, the duplication check considers.
    pub duplication_threshold: usize,
    /// How long a silent peer's selections stay visible (in milliseconds).
    pub presence_timeout_ms: u64,
    /// Capacity of event and message channels.
    pub channel_capacity: usize,
    /// Whether to arm the duplication watchdog at all.
    pub watchdog: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            watchdog_delay_ms: 1500,
            duplication_threshold: 20,
            presence_timeout_ms: 30_000,
            channel_capacity: 100,
            watchdog: true,
        }
    }
}

/// Builder for sync configuration.
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    pub fn watchdog_delay(mut self, ms: u64) -> Self {
        self.config.watchdog_delay_ms = ms;
        self
    }

    pub fn duplication_threshold(mut self, chars: usize) -> Self {
        self.config.duplication_threshold = chars;
        self
    }

    pub fn presence_timeout(mut self, ms: u64) -> Self {
        self.config.presence_timeout_ms = ms;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn watchdog(mut self, enabled: bool) -> Self {
        self.config.watchdog = enabled;
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Events emitted by a session's sync layer.
#[derive(Clone, Debug)]
pub enum SyncEvent {
    /// Full state exchanged with a peer for a document.
    SyncCompleted {
        peer_id: PeerId,
        document_id: String,
    },
    /// Received an incremental update from a peer.
    ReceivedUpdate {
        peer_id: PeerId,
        document_id: String,
    },
    /// Broadcast local ops to peers.
    SentUpdate { document_id: String, bytes: usize },
    /// Sync error occurred.
    SyncError { peer_id: PeerId, error: String },
}

/// Sync state for a peer.
#[derive(Clone, Debug, Default)]
pub struct PeerSyncState {
    /// Documents exchanged in full with this peer, and when.
    pub documents: HashMap<String, Instant>,
    /// Last time anything was received from the peer.
    pub last_sync: Option<Instant>,
}

/// Remembers which peers a session has synchronized with.
#[derive(Debug, Default)]
pub struct SyncTracker {
    peer_states: HashMap<PeerId, PeerSyncState>,
}

impl SyncTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note a full exchange of `document_id` with a peer. Returns true if it
    /// was the first for that pair.
    pub fn record_sync(&mut self, peer_id: &PeerId, document_id: &str) -> bool {
        let now = Instant::now();
        let state = self.peer_states.entry(peer_id.clone()).or_default();
        state.last_sync = Some(now);
        state.documents.insert(document_id.to_string(), now).is_none()
    }

    /// Note that something arrived from a peer.
    pub fn touch(&mut self, peer_id: &PeerId) {
        self.peer_states.entry(peer_id.clone()).or_default().last_sync = Some(Instant::now());
    }

    pub fn get_peer_state(&self, peer_id: &PeerId) -> Option<&PeerSyncState> {
        self.peer_states.get(peer_id)
    }

    /// Peers that have exchanged full state for `document_id`.
    pub fn peers_synced(&self, document_id: &str) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self
            .peer_states
            .iter()
            .filter(|(_, state)| state.documents.contains_key(document_id))
            .map(|(peer, _)| peer.clone())
            .collect();
        peers.sort_by(|a, b| a.0.cmp(&b.0));
        peers
    }

    pub fn forget_peer(&mut self, peer_id: &PeerId) -> bool {
        self.peer_states.remove(peer_id).is_some()
    }

    pub fn forget_document(&mut self, document_id: &str) {
        for state in self.peer_states.values_mut() {
            state.documents.remove(document_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_config_builder() {
        let config = SyncConfigBuilder::new()
            .watchdog_delay(10)
            .duplication_threshold(4)
            .presence_timeout(250)
            .channel_capacity(8)
            .watchdog(false)
            .build();

        assert_eq!(config.watchdog_delay_ms, 10);
        assert_eq!(config.duplication_threshold, 4);
        assert_eq!(config.presence_timeout_ms, 250);
        assert_eq!(config.channel_capacity, 8);
        assert!(!config.watchdog);
    }

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.watchdog_delay_ms, 1500);
        assert_eq!(config.duplication_threshold, 20);
        assert!(config.watchdog);
    }

    #[test]
    fn test_tracker_records_first_sync_once() {
        let mut tracker = SyncTracker::new();
        let peer = PeerId::new("peer-1");

        assert!(tracker.record_sync(&peer, "doc"));
        assert!(!tracker.record_sync(&peer, "doc"));
        assert!(tracker.record_sync(&peer, "other"));
        assert_eq!(tracker.peers_synced("doc"), vec![peer.clone()]);

        tracker.forget_document("doc");
        assert!(tracker.peers_synced("doc").is_empty());
        assert!(tracker.forget_peer(&peer));
        assert!(tracker.get_peer_state(&peer).is_none());
    }
}
