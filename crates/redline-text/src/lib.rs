//! # redline-text
//!
//! Replicated attributed text with a track-changes layer.
//!
//! This crate provides:
//! - `RGAText`: an RGA sequence whose characters carry last-writer-wins
//!   attributes, with an origin-tagged change feed
//! - Tracked-change derivation and the accept/reject mutations
//! - A per-document undo manager that records local changes only
//! - Presence tracking for peer selections
//!
//! ## Example
//!
//! ```rust
//! use redline_text::{collect_tracked_changes, Attributes, Attribution, RGAText};
//!
//! let mut text = RGAText::new("replica-1");
//! text.insert(0, "Hello").unwrap();
//! let proposal = Attributes::tracked_insert(Attribution::new("u1", "Ann", 0));
//! text.insert_with(5, " world", &proposal).unwrap();
//!
//! let changes = collect_tracked_changes(&text);
//! assert_eq!(changes.len(), 1);
//! assert_eq!(changes[0].text, " world");
//! ```

pub mod attrs;
pub mod delta;
pub mod error;
pub mod presence;
pub mod rga_text;
pub mod tracked;
pub mod undo;

pub use attrs::{
    clear, mark_delete, mark_insert, normalize_patch, AttrKey, AttrPatch, AttrValue, Attributes,
    Attribution,
};
pub use delta::{DeltaOp, Origin, Run, TextChange, TextEvent};
pub use error::{Result, TextError};
pub use presence::{
    CursorColors, PeerPresence, PeerSelection, PresenceTracker, PresenceUpdate, Selection,
    SessionId,
};
pub use rga_text::{FormatRecord, InsertRecord, RGAText, TextId, TextUpdate};
pub use tracked::{
    accept_all, accept_change, apply_accept, apply_reject, collect_tracked_changes, find_change,
    reject_all, reject_change, ChangeKind, TrackedChange,
};
pub use undo::{GroupId, UndoBatch, UndoManager};
