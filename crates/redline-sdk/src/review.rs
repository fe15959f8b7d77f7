//! What the editing surface renders for tracked changes.

use chrono::{TimeZone, Utc};
use redline_text::{ChangeKind, TrackedChange};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecorationKind {
    TrackedInsert,
    TrackedDelete,
}

/// A styled range over one tracked change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoration {
    pub from: usize,
    pub to: usize,
    pub kind: DecorationKind,
    pub change_id: String,
    pub author_color: Option<String>,
    pub tooltip: String,
}

impl Decoration {
    pub fn for_change(change: &TrackedChange) -> Self {
        let kind = match change.kind {
            ChangeKind::Insert => DecorationKind::TrackedInsert,
            ChangeKind::Delete => DecorationKind::TrackedDelete,
        };
        Self {
            from: change.position,
            to: change.end(),
            kind,
            change_id: change.id.clone(),
            author_color: change.author_color.clone(),
            tooltip: tooltip(change),
        }
    }
}

pub fn decorations(changes: &[TrackedChange]) -> Vec<Decoration> {
    changes.iter().map(Decoration::for_change).collect()
}

/// "Inserted by Ann on 2024-03-01 14:05 UTC".
pub fn tooltip(change: &TrackedChange) -> String {
    let verb = match change.kind {
        ChangeKind::Insert => "Inserted",
        ChangeKind::Delete => "Deleted",
    };
    match Utc.timestamp_millis_opt(change.timestamp).single() {
        Some(at) => format!(
            "{} by {} on {} UTC",
            verb,
            change.author_name,
            at.format("%Y-%m-%d %H:%M")
        ),
        None => format!("{} by {}", verb, change.author_name),
    }
}

/// Counts for a review panel header.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub insertions: usize,
    pub deletions: usize,
    /// Author names, sorted and deduplicated.
    pub authors: Vec<String>,
}

impl ReviewSummary {
    pub fn from_changes(changes: &[TrackedChange]) -> Self {
        let mut summary = Self::default();
        for change in changes {
            match change.kind {
                ChangeKind::Insert => summary.insertions += 1,
                ChangeKind::Delete => summary.deletions += 1,
            }
            summary.authors.push(change.author_name.clone());
        }
        summary.authors.sort();
        summary.authors.dedup();
        summary
    }

    pub fn total(&self) -> usize {
        self.insertions + self.deletions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(kind: ChangeKind, author: &str, timestamp: i64) -> TrackedChange {
        TrackedChange {
            id: format!("{}-0-{}-{}", kind, author, timestamp),
            kind,
            position: 3,
            length: 4,
            text: "text".into(),
            author_id: author.into(),
            author_name: author.to_uppercase(),
            author_color: Some("#2196F3".into()),
            timestamp,
        }
    }

    #[test]
    fn test_tooltip_format() {
        // 2024-03-01T14:05:00Z
        let c = change(ChangeKind::Insert, "ann", 1_709_301_900_000);
        assert_eq!(tooltip(&c), "Inserted by ANN on 2024-03-01 14:05 UTC");

        let d = change(ChangeKind::Delete, "bo", 0);
        assert_eq!(tooltip(&d), "Deleted by BO on 1970-01-01 00:00 UTC");
    }

    #[test]
    fn test_decoration_covers_change() {
        let c = change(ChangeKind::Delete, "ann", 0);
        let deco = Decoration::for_change(&c);
        assert_eq!((deco.from, deco.to), (3, 7));
        assert_eq!(deco.kind, DecorationKind::TrackedDelete);
        assert_eq!(deco.author_color.as_deref(), Some("#2196F3"));
    }

    #[test]
    fn test_summary() {
        let changes = vec![
            change(ChangeKind::Insert, "ann", 1),
            change(ChangeKind::Insert, "bo", 2),
            change(ChangeKind::Delete, "ann", 3),
        ];
        let summary = ReviewSummary::from_changes(&changes);
        assert_eq!(summary.insertions, 2);
        assert_eq!(summary.deletions, 1);
        assert_eq!(summary.authors, vec!["ANN".to_string(), "BO".to_string()]);
        assert_eq!(summary.total(), 3);
    }
}
