//! Presence System - ephemeral peer selections.
//!
//! Provides collaborative awareness features:
//! - Selection anchor/head per document for every connected session
//! - Lamport-ordered updates, so a late packet never rewinds a peer
//! - Expiration of sessions that stopped sending
//!
//! Nothing here is persisted or part of document convergence.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ulid::Ulid;

/// Identifier of one connected editor session. A user with two tabs open
/// has two sessions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A selection as it travels on the wire. Either end may be missing when a
/// peer has focus elsewhere.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Option<usize>,
    pub head: Option<usize>,
}

impl Selection {
    /// A collapsed selection.
    pub fn caret(position: usize) -> Self {
        Self {
            anchor: Some(position),
            head: Some(position),
        }
    }

    pub fn range(anchor: usize, head: usize) -> Self {
        Self {
            anchor: Some(anchor),
            head: Some(head),
        }
    }

    /// Both ends, if both are known.
    pub fn resolved(&self) -> Option<(usize, usize)> {
        Some((self.anchor?, self.head?))
    }
}

/// Presence data for a single session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerPresence {
    pub session_id: SessionId,
    pub user_id: String,
    pub display_name: String,
    pub color: String,
    /// Selections by document id.
    pub selections: HashMap<String, Selection>,
    /// Per-session Lamport counter.
    pub clock: u64,
    /// When this record was last written or received (milliseconds since epoch).
    #[serde(skip, default = "now_millis")]
    pub last_seen: u64,
}

impl PeerPresence {
    pub fn new(
        session_id: SessionId,
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            user_id: user_id.into(),
            display_name: display_name.into(),
            color: color.into(),
            selections: HashMap::new(),
            clock: 0,
            last_seen: now_millis(),
        }
    }

    pub fn selection(&self, document_id: &str) -> Option<&Selection> {
        self.selections.get(document_id)
    }

    fn touch(&mut self) {
        self.last_seen = now_millis();
        self.clock += 1;
    }

    /// Check if this presence is stale (not updated within timeout).
    pub fn is_stale(&self, timeout_ms: u64) -> bool {
        now_millis().saturating_sub(self.last_seen) > timeout_ms
    }
}

/// A remote peer's resolved selection in one document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerSelection {
    pub session_id: SessionId,
    pub user_id: String,
    pub display_name: String,
    pub color: String,
    pub anchor: usize,
    pub head: usize,
}

impl PeerSelection {
    pub fn is_caret(&self) -> bool {
        self.anchor == self.head
    }

    /// The selected range in ascending order.
    pub fn range(&self) -> (usize, usize) {
        (self.anchor.min(self.head), self.anchor.max(self.head))
    }
}

/// Presence changes to ship to other sessions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    pub updates: Vec<PeerPresence>,
    pub removals: Vec<SessionId>,
}

impl PresenceUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.removals.is_empty()
    }
}

/// Presence tracker for a collaborative session.
#[derive(Clone, Debug, PartialEq)]
pub struct PresenceTracker {
    local_session: SessionId,
    peers: HashMap<SessionId, PeerPresence>,
    /// Timeout for stale presence (milliseconds).
    stale_timeout: u64,
    pending_update: Option<PresenceUpdate>,
}

impl PresenceTracker {
    pub fn new(local: PeerPresence) -> Self {
        let local_session = local.session_id.clone();
        let mut peers = HashMap::new();
        peers.insert(local_session.clone(), local);
        Self {
            local_session,
            peers,
            stale_timeout: 30_000,
            pending_update: None,
        }
    }

    pub fn local_session(&self) -> &SessionId {
        &self.local_session
    }

    pub fn set_stale_timeout(&mut self, timeout_ms: u64) {
        self.stale_timeout = timeout_ms;
    }

    pub fn local_presence(&self) -> Option<&PeerPresence> {
        self.peers.get(&self.local_session)
    }

    fn update_local(&mut self, f: impl FnOnce(&mut PeerPresence)) {
        if let Some(presence) = self.peers.get_mut(&self.local_session) {
            f(presence);
            presence.touch();
            let snapshot = presence.clone();
            let update = self.pending_update.get_or_insert_with(PresenceUpdate::new);
            update.updates.retain(|p| p.session_id != snapshot.session_id);
            update.updates.push(snapshot);
        }
    }

    // === Local Operations ===

    /// Update the local selection in a document.
    pub fn set_selection(&mut self, document_id: impl Into<String>, selection: Selection) {
        let document_id = document_id.into();
        self.update_local(|p| {
            p.selections.insert(document_id, selection);
        });
    }

    /// Forget the local selection in a document.
    pub fn clear_selection(&mut self, document_id: &str) {
        self.update_local(|p| {
            p.selections.remove(document_id);
        });
    }

    /// Re-announce the local record to keep it from going stale.
    pub fn heartbeat(&mut self) {
        self.update_local(|_| {});
    }

    /// Announce that the local session is leaving.
    pub fn leave(&mut self) {
        let update = self.pending_update.get_or_insert_with(PresenceUpdate::new);
        update.removals.push(self.local_session.clone());
    }

    // === Queries ===

    pub fn get(&self, session_id: &SessionId) -> Option<&PeerPresence> {
        self.peers.get(session_id)
    }

    /// Sessions currently known, the local one included.
    pub fn sessions(&self) -> impl Iterator<Item = &PeerPresence> + '_ {
        self.peers.values()
    }

    /// Selections of every other session in `document_id`. Sessions missing
    /// either end of their selection are skipped.
    pub fn peer_selections(&self, document_id: &str) -> Vec<PeerSelection> {
        let mut selections: Vec<PeerSelection> = self
            .peers
            .values()
            .filter(|p| p.session_id != self.local_session)
            .filter_map(|p| {
                let (anchor, head) = p.selection(document_id)?.resolved()?;
                Some(PeerSelection {
                    session_id: p.session_id.clone(),
                    user_id: p.user_id.clone(),
                    display_name: p.display_name.clone(),
                    color: p.color.clone(),
                    anchor,
                    head,
                })
            })
            .collect();
        selections.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        selections
    }

    // === Sync ===

    pub fn take_update(&mut self) -> Option<PresenceUpdate> {
        self.pending_update.take()
    }

    /// Apply presence from other sessions. Returns true if anything changed.
    pub fn apply_update(&mut self, update: &PresenceUpdate) -> bool {
        let mut changed = false;
        for presence in &update.updates {
            if presence.session_id == self.local_session {
                continue;
            }
            if let Some(existing) = self.peers.get(&presence.session_id) {
                if presence.clock <= existing.clock {
                    continue;
                }
            }
            let mut presence = presence.clone();
            presence.last_seen = now_millis();
            self.peers.insert(presence.session_id.clone(), presence);
            changed = true;
        }

        for session_id in &update.removals {
            changed |= self.remove_session(session_id);
        }
        changed
    }

    /// Drop a remote session. The local session cannot be removed.
    pub fn remove_session(&mut self, session_id: &SessionId) -> bool {
        *session_id != self.local_session && self.peers.remove(session_id).is_some()
    }

    /// Remove sessions that have not been heard from within the timeout.
    pub fn cleanup_stale(&mut self) -> Vec<SessionId> {
        let stale: Vec<_> = self
            .peers
            .iter()
            .filter(|(id, p)| *id != &self.local_session && p.is_stale(self.stale_timeout))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            self.peers.remove(id);
        }
        stale
    }
}

/// Get current time in milliseconds.
fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Color palette for peer cursors.
pub struct CursorColors;

impl CursorColors {
    pub const COLORS: [&'static str; 12] = [
        "#E91E63", // Pink
        "#9C27B0", // Purple
        "#3F51B5", // Indigo
        "#2196F3", // Blue
        "#00BCD4", // Cyan
        "#009688", // Teal
        "#4CAF50", // Green
        "#8BC34A", // Light Green
        "#CDDC39", // Lime
        "#FF9800", // Orange
        "#FF5722", // Deep Orange
        "#795548", // Brown
    ];

    /// Get a color for a user based on their ID.
    pub fn color_for_user(user_id: &str) -> &'static str {
        let hash: usize = user_id.bytes().map(|b| b as usize).sum();
        Self::COLORS[hash % Self::COLORS.len()]
    }
}
