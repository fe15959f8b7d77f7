//! Awareness: where other sessions have their selections, and what the
//! editing surface draws for them.

use parking_lot::RwLock;
use redline_text::{
    CursorColors, PeerPresence, PeerSelection, PresenceTracker, PresenceUpdate, Selection,
    SessionId,
};
use std::sync::Arc;
use tokio::sync::broadcast;

/// A peer selection as drawn in the editor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionMark {
    /// A caret with the peer's name on a label.
    Caret {
        position: usize,
        color: String,
        name: String,
    },
    /// A tinted range.
    Highlight {
        from: usize,
        to: usize,
        color: String,
    },
}

/// Turn peer selections into editor marks. Positions are clamped to a text
/// of `len` characters; a non-empty selection yields a highlight plus a
/// caret at its head.
pub fn selection_marks(selections: &[PeerSelection], len: usize) -> Vec<SelectionMark> {
    let mut marks = Vec::new();
    for selection in selections {
        let (from, to) = selection.range();
        let (from, to) = (from.min(len), to.min(len));
        if from < to {
            marks.push(SelectionMark::Highlight {
                from,
                to,
                color: selection.color.clone(),
            });
        }
        marks.push(SelectionMark::Caret {
            position: selection.head.min(len),
            color: selection.color.clone(),
            name: selection.display_name.clone(),
        });
    }
    marks
}

/// Events for presence changes.
#[derive(Clone, Debug)]
pub enum AwarenessEvent {
    /// The local selection changed in a document.
    LocalSelection {
        document_id: String,
        selection: Selection,
    },
    /// Remote sessions changed.
    PeersChanged,
    /// A session went away, by goodbye or timeout.
    SessionLeft(SessionId),
}

/// Awareness manager for a session.
pub struct Awareness {
    local_user_id: String,
    local_user_name: String,
    local_color: String,
    tracker: Arc<RwLock<PresenceTracker>>,
    event_tx: broadcast::Sender<AwarenessEvent>,
}

impl Awareness {
    /// Create a new awareness manager. Without an explicit color the user
    /// gets one from the palette.
    pub fn new(
        session_id: SessionId,
        local_user_id: impl Into<String>,
        local_user_name: impl Into<String>,
        color: Option<String>,
    ) -> Self {
        let local_user_id = local_user_id.into();
        let local_user_name = local_user_name.into();
        let local_color =
            color.unwrap_or_else(|| CursorColors::color_for_user(&local_user_id).to_string());
        let local = PeerPresence::new(
            session_id,
            local_user_id.clone(),
            local_user_name.clone(),
            local_color.clone(),
        );

        let (event_tx, _) = broadcast::channel(100);

        Self {
            local_user_id,
            local_user_name,
            local_color,
            tracker: Arc::new(RwLock::new(PresenceTracker::new(local))),
            event_tx,
        }
    }

    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }

    pub fn local_user_name(&self) -> &str {
        &self.local_user_name
    }

    pub fn local_color(&self) -> &str {
        &self.local_color
    }

    pub fn local_session(&self) -> SessionId {
        self.tracker.read().local_session().clone()
    }

    pub fn set_stale_timeout(&self, timeout_ms: u64) {
        self.tracker.write().set_stale_timeout(timeout_ms);
    }

    /// Set the local selection in a document.
    pub fn set_selection(&self, document_id: &str, anchor: usize, head: usize) {
        let selection = Selection::range(anchor, head);
        self.tracker.write().set_selection(document_id, selection);
        let _ = self.event_tx.send(AwarenessEvent::LocalSelection {
            document_id: document_id.to_string(),
            selection,
        });
    }

    /// Forget the local selection in a document, e.g. when it is closed.
    pub fn clear_selection(&self, document_id: &str) {
        self.tracker.write().clear_selection(document_id);
    }

    pub fn heartbeat(&self) {
        self.tracker.write().heartbeat();
    }

    /// Queue the local session's removal for the next update.
    pub fn leave(&self) {
        self.tracker.write().leave();
    }

    /// Local changes to ship to peers.
    pub fn take_update(&self) -> Option<PresenceUpdate> {
        self.tracker.write().take_update()
    }

    /// Apply presence received from a peer.
    pub fn apply_update(&self, update: &PresenceUpdate) -> bool {
        let changed = self.tracker.write().apply_update(update);
        if changed {
            let _ = self.event_tx.send(AwarenessEvent::PeersChanged);
        }
        changed
    }

    pub fn remove_session(&self, session_id: &SessionId) -> bool {
        let removed = self.tracker.write().remove_session(session_id);
        if removed {
            let _ = self.event_tx.send(AwarenessEvent::SessionLeft(session_id.clone()));
        }
        removed
    }

    /// Other sessions' selections in a document. The local session is never
    /// included.
    pub fn peer_selections(&self, document_id: &str) -> Vec<PeerSelection> {
        self.tracker.read().peer_selections(document_id)
    }

    /// Editor marks for other sessions' selections in a document.
    pub fn marks(&self, document_id: &str, len: usize) -> Vec<SelectionMark> {
        selection_marks(&self.peer_selections(document_id), len)
    }

    /// Number of known sessions, the local one included.
    pub fn session_count(&self) -> usize {
        self.tracker.read().sessions().count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AwarenessEvent> {
        self.event_tx.subscribe()
    }

    /// Remove sessions that have gone quiet.
    pub fn cleanup_stale(&self) -> Vec<SessionId> {
        let stale = self.tracker.write().cleanup_stale();
        for session_id in &stale {
            let _ = self.event_tx.send(AwarenessEvent::SessionLeft(session_id.clone()));
        }
        stale
    }
}
