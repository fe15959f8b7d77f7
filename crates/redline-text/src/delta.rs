//! Delta representation and the change feed.
//!
//! The document is enumerated as a sequence of [`DeltaOp::Insert`] runs. A
//! change is described as `[Retain{position}, op]`, the usual rich-text delta
//! shape, so consumers pattern-match a closed set of variants instead of
//! probing loosely shaped payloads.

use crate::attrs::{AttrPatch, Attributes};
use serde::{Deserialize, Serialize};

/// One step of a rich-text delta.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaOp {
    /// Text carrying the given attributes.
    Insert { text: String, attrs: Attributes },
    /// Skip `len` characters, optionally reformatting them.
    Retain { len: usize, attrs: Option<AttrPatch> },
    /// Remove `len` characters.
    Delete { len: usize },
}

impl DeltaOp {
    pub fn retain(len: usize) -> Self {
        DeltaOp::Retain { len, attrs: None }
    }

    /// Number of characters the op spans.
    pub fn len(&self) -> usize {
        match self {
            DeltaOp::Insert { text, .. } => text.chars().count(),
            DeltaOp::Retain { len, .. } | DeltaOp::Delete { len } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A maximal span of text sharing identical attributes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub text: String,
    pub attrs: Attributes,
}

impl Run {
    pub fn new(text: impl Into<String>, attrs: Attributes) -> Self {
        Self {
            text: text.into(),
            attrs,
        }
    }

    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl From<Run> for DeltaOp {
    fn from(run: Run) -> Self {
        DeltaOp::Insert {
            text: run.text,
            attrs: run.attrs,
        }
    }
}

/// Append a character to a run list, extending the last run when the
/// attributes match.
pub(crate) fn push_char(runs: &mut Vec<Run>, ch: char, attrs: &Attributes) {
    match runs.last_mut() {
        Some(last) if &last.attrs == attrs => last.text.push(ch),
        _ => runs.push(Run::new(ch.to_string(), attrs.clone())),
    }
}

/// Where a transaction came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// A local user edit, including review actions.
    Local,
    /// An update received from another replica.
    Remote,
    /// Programmatic application: undo/redo, bootstrap content and repairs.
    Replay,
}

/// A single positional change, with enough of the prior state to invert it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextChange {
    Inserted {
        position: usize,
        text: String,
        attrs: Attributes,
    },
    Deleted {
        position: usize,
        removed: Vec<Run>,
    },
    Formatted {
        position: usize,
        length: usize,
        patch: AttrPatch,
        prior: Vec<Run>,
    },
}

impl TextChange {
    pub fn position(&self) -> usize {
        match self {
            TextChange::Inserted { position, .. }
            | TextChange::Deleted { position, .. }
            | TextChange::Formatted { position, .. } => *position,
        }
    }

    /// Characters affected by the change.
    pub fn len(&self) -> usize {
        match self {
            TextChange::Inserted { text, .. } => text.chars().count(),
            TextChange::Deleted { removed, .. } => removed.iter().map(Run::len).sum(),
            TextChange::Formatted { length, .. } => *length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The change as a rich-text delta.
    pub fn delta(&self) -> Vec<DeltaOp> {
        let mut ops = Vec::with_capacity(2);
        if self.position() > 0 {
            ops.push(DeltaOp::retain(self.position()));
        }
        ops.push(match self {
            TextChange::Inserted { text, attrs, .. } => DeltaOp::Insert {
                text: text.clone(),
                attrs: attrs.clone(),
            },
            TextChange::Deleted { .. } => DeltaOp::Delete { len: self.len() },
            TextChange::Formatted { length, patch, .. } => DeltaOp::Retain {
                len: *length,
                attrs: Some(patch.clone()),
            },
        });
        ops
    }

    /// The changes that undo this one, in application order.
    pub fn inverse(&self) -> Vec<TextChange> {
        match self {
            TextChange::Inserted {
                position,
                text,
                attrs,
            } => vec![TextChange::Deleted {
                position: *position,
                removed: vec![Run::new(text.clone(), attrs.clone())],
            }],
            TextChange::Deleted { position, removed } => {
                let mut at = *position;
                removed
                    .iter()
                    .map(|run| {
                        let change = TextChange::Inserted {
                            position: at,
                            text: run.text.clone(),
                            attrs: run.attrs.clone(),
                        };
                        at += run.len();
                        change
                    })
                    .collect()
            }
            TextChange::Formatted {
                position,
                patch,
                prior,
                ..
            } => {
                let mut at = *position;
                prior
                    .iter()
                    .map(|run| {
                        let mut after = run.attrs.clone();
                        after.apply(patch);
                        let change = TextChange::Formatted {
                            position: at,
                            length: run.len(),
                            patch: run.attrs.restore_patch(patch.keys()),
                            prior: vec![Run::new(run.text.clone(), after)],
                        };
                        at += run.len();
                        change
                    })
                    .collect()
            }
        }
    }
}

/// A change tagged with the origin of the transaction that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEvent {
    pub origin: Origin,
    pub change: TextChange,
}

impl TextEvent {
    pub fn new(origin: Origin, change: TextChange) -> Self {
        Self { origin, change }
    }

    pub fn is_local(&self) -> bool {
        self.origin == Origin::Local
    }

    pub fn delta(&self) -> Vec<DeltaOp> {
        self.change.delta()
    }

    /// Fold `next` into this event when it continues the same edit at the
    /// adjacent position. Returns false if the two cannot be merged.
    pub(crate) fn try_extend(&mut self, next: &TextEvent) -> bool {
        if self.origin != next.origin {
            return false;
        }
        match (&mut self.change, &next.change) {
            (
                TextChange::Inserted {
                    position,
                    text,
                    attrs,
                },
                TextChange::Inserted {
                    position: p2,
                    text: t2,
                    attrs: a2,
                },
            ) if *p2 == *position + text.chars().count() && *attrs == *a2 => {
                text.push_str(t2);
                true
            }
            (
                TextChange::Deleted { position, removed },
                TextChange::Deleted {
                    position: p2,
                    removed: r2,
                },
            ) if *p2 == *position => {
                for run in r2 {
                    for ch in run.text.chars() {
                        push_char(removed, ch, &run.attrs);
                    }
                }
                true
            }
            (
                TextChange::Formatted {
                    position,
                    length,
                    patch,
                    prior,
                },
                TextChange::Formatted {
                    position: p2,
                    length: l2,
                    patch: patch2,
                    prior: prior2,
                },
            ) if *p2 == *position + *length && *patch == *patch2 => {
                *length += *l2;
                for run in prior2 {
                    for ch in run.text.chars() {
                        push_char(prior, ch, &run.attrs);
                    }
                }
                true
            }
            _ => false,
        }
    }
}
