//! Redline SDK - collaborative editing with track changes
//!
//! This SDK wraps the replicated text of `redline-text` in document handles
//! that turn local edits into attributed proposals, lets reviewers accept or
//! reject them, and keeps peers in sync.
//!
//! # Quick Start
//!
//! ```rust
//! use redline_sdk::{Client, ClientConfig, EditChange, EditTransaction};
//!
//! let client = Client::new_with_memory_transport(ClientConfig {
//!     user_id: "ann".to_string(),
//!     user_name: "Ann".to_string(),
//!     ..Default::default()
//! });
//! let session = client.create_session("review");
//! let doc = session.open_document_with_text("notes", "Hello");
//!
//! doc.write().dispatch(EditTransaction::single(EditChange::insert(5, " world")));
//!
//! let changes = doc.read().tracked_changes();
//! assert_eq!(changes[0].text, " world");
//! doc.write().accept_all();
//! assert!(doc.read().tracked_changes().is_empty());
//! ```
//!
//! # Architecture
//!
//! - [`client`] - Entry point owning the transport and sessions
//! - [`session`] - Open documents of one editor session and its message loop
//! - [`document`] - The document handle: edit cycle, deferred marks, undo, review
//! - [`mediator`] - Classifies local edits as pass-through or redirect
//! - [`review`] - Decorations and summaries for tracked changes
//! - [`presence`] - Peer selections and their rendering
//! - [`watchdog`] - Post-sync duplicated content repair
//! - [`sync`] / [`network`] - Replication settings and transports
//! - [`error`] - Error types

pub mod client;
pub mod document;
pub mod error;
pub mod mediator;
pub mod network;
pub mod presence;
pub mod review;
pub mod session;
pub mod sync;
pub mod watchdog;

pub use client::{Client, ClientConfig, ClientConfigBuilder};
pub use document::{Author, DocEvent, Document, PendingMutation};
pub use error::{Result, SdkError};
pub use mediator::{
    EditChange, EditTransaction, Gesture, Mediator, MediatorState, PassReason, TextSelection,
    Verdict,
};
pub use network::{MemoryTransport, Message, NetworkError, NetworkTransport, Peer, PeerId, PeerState};
pub use presence::{selection_marks, Awareness, AwarenessEvent, SelectionMark};
pub use review::{decorations, tooltip, Decoration, DecorationKind, ReviewSummary};
pub use session::{Session, SessionEvent};
pub use sync::{SyncConfig, SyncConfigBuilder, SyncEvent, SyncTracker};
pub use watchdog::{detect_duplication, DuplicationWatchdog};

// Re-export commonly used types from redline-text
pub use redline_text::{
    AttrKey, AttrValue, Attributes, Attribution, ChangeKind, Origin, PeerSelection, SessionId,
    TextChange, TextEvent, TrackedChange,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client::{Client, ClientConfig};
    pub use crate::document::{Author, DocEvent, Document};
    pub use crate::error::SdkError;
    pub use crate::mediator::{EditChange, EditTransaction, TextSelection, Verdict};
    pub use crate::network::{NetworkTransport, Peer, PeerId};
    pub use crate::presence::Awareness;
    pub use crate::session::Session;
    pub use crate::sync::SyncConfig;
    pub use redline_text::{ChangeKind, TrackedChange};
}
