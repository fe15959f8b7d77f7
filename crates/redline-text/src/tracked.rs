//! Tracked changes derived from the attribute runs of a text.
//!
//! Nothing here is stored: the list is recomputed from the current runs on
//! every call, and review actions re-resolve their target by id first.

use crate::attrs::{clear, AttrKey, Attribution};
use crate::error::Result;
use crate::rga_text::RGAText;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a change proposes new text or the removal of existing text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Insert,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reviewable unit: consecutive characters carrying the same kind of mark
/// from the same author.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedChange {
    /// Derived from kind, position, author and timestamp. Not stable across
    /// edits that shift the change.
    pub id: String,
    pub kind: ChangeKind,
    pub position: usize,
    pub length: usize,
    pub text: String,
    pub author_id: String,
    pub author_name: String,
    pub author_color: Option<String>,
    /// Earliest timestamp of the merged runs.
    pub timestamp: i64,
}

impl TrackedChange {
    fn from_run(kind: ChangeKind, position: usize, text: &str, attribution: &Attribution) -> Self {
        Self {
            id: String::new(),
            kind,
            position,
            length: text.chars().count(),
            text: text.to_string(),
            author_id: attribution.author_id.clone(),
            author_name: attribution.author_name.clone(),
            author_color: attribution.author_color.clone(),
            timestamp: attribution.timestamp,
        }
    }

    /// End of the covered range (exclusive).
    pub fn end(&self) -> usize {
        self.position + self.length
    }

    fn continues(&self, next: &TrackedChange) -> bool {
        self.kind == next.kind && self.author_id == next.author_id && self.end() == next.position
    }

    fn absorb(&mut self, next: TrackedChange) {
        self.length += next.length;
        self.text.push_str(&next.text);
        self.timestamp = self.timestamp.min(next.timestamp);
    }

    fn assign_id(&mut self) {
        self.id = format!(
            "{}-{}-{}-{}",
            self.kind, self.position, self.author_id, self.timestamp
        );
    }
}

/// Derive the tracked changes of `text` in one left-to-right pass.
pub fn collect_tracked_changes(text: &RGAText) -> Vec<TrackedChange> {
    let mut changes: Vec<TrackedChange> = Vec::new();
    let mut position = 0;

    for run in text.runs() {
        let length = run.len();
        let candidate = if let Some(attribution) = run.attrs.track_insert() {
            Some(TrackedChange::from_run(ChangeKind::Insert, position, &run.text, attribution))
        } else {
            run.attrs
                .track_delete()
                .map(|a| TrackedChange::from_run(ChangeKind::Delete, position, &run.text, a))
        };
        position += length;

        let Some(candidate) = candidate.filter(|c| c.length > 0) else {
            continue;
        };
        match changes.last_mut() {
            Some(last) if last.continues(&candidate) => last.absorb(candidate),
            _ => changes.push(candidate),
        }
    }

    for change in &mut changes {
        change.assign_id();
    }
    changes
}

/// Look a change up by id in the current state.
pub fn find_change(text: &RGAText, id: &str) -> Option<TrackedChange> {
    collect_tracked_changes(text)
        .into_iter()
        .find(|c| c.id == id)
}

/// Keep the proposal: an insertion loses its mark, a deletion is carried out.
pub fn apply_accept(text: &mut RGAText, change: &TrackedChange) -> Result<()> {
    match change.kind {
        ChangeKind::Insert => text.format(change.position, change.length, &clear(AttrKey::TrackInsert)),
        ChangeKind::Delete => text.delete(change.position, change.length),
    }
}

/// Drop the proposal: an insertion is removed, a deletion loses its mark.
pub fn apply_reject(text: &mut RGAText, change: &TrackedChange) -> Result<()> {
    match change.kind {
        ChangeKind::Insert => text.delete(change.position, change.length),
        ChangeKind::Delete => text.format(change.position, change.length, &clear(AttrKey::TrackDelete)),
    }
}

/// Accept the change with `id`. Returns false if no such change exists.
pub fn accept_change(text: &mut RGAText, id: &str) -> Result<bool> {
    match find_change(text, id) {
        Some(change) => apply_accept(text, &change).map(|_| true),
        None => Ok(false),
    }
}

/// Reject the change with `id`. Returns false if no such change exists.
pub fn reject_change(text: &mut RGAText, id: &str) -> Result<bool> {
    match find_change(text, id) {
        Some(change) => apply_reject(text, &change).map(|_| true),
        None => Ok(false),
    }
}

/// Changes ordered so that applying them one by one never shifts the ones
/// still to come.
fn back_to_front(text: &RGAText) -> Vec<TrackedChange> {
    let mut changes = collect_tracked_changes(text);
    changes.sort_by(|a, b| b.position.cmp(&a.position));
    changes
}

/// Accept every change. Returns how many were applied.
pub fn accept_all(text: &mut RGAText) -> Result<usize> {
    let changes = back_to_front(text);
    for change in &changes {
        apply_accept(text, change)?;
    }
    Ok(changes.len())
}

/// Reject every change. Returns how many were applied.
pub fn reject_all(text: &mut RGAText) -> Result<usize> {
    let changes = back_to_front(text);
    for change in &changes {
        apply_reject(text, change)?;
    }
    Ok(changes.len())
}
