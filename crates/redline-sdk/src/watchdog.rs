//! Post-sync duplication watchdog.
//!
//! Two replicas that seed the same document independently and then merge
//! end up with the text twice, back to back. Shortly after initial sync the
//! watchdog looks for that shape and removes the second copy.

use crate::document::Document;
use crate::network::{Message, NetworkTransport};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// If `text` is exactly two equal halves and longer than `threshold`
/// characters, return the length of one half.
pub fn detect_duplication(text: &str, threshold: usize) -> Option<usize> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    if len <= threshold || len % 2 != 0 {
        return None;
    }
    let half = len / 2;
    (chars[..half] == chars[half..]).then_some(half)
}

/// A scheduled duplication check. Dropping the handle cancels it.
pub struct DuplicationWatchdog {
    handle: JoinHandle<()>,
}

impl DuplicationWatchdog {
    /// Check `document` once after `delay`. A repair is broadcast so peers
    /// converge on the single copy.
    pub fn spawn<T: NetworkTransport>(
        document: Arc<RwLock<Document>>,
        transport: Arc<T>,
        delay: Duration,
        threshold: usize,
    ) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let (document_id, outbound) = {
                let mut doc = document.write();
                if doc.repair_duplication(threshold).is_none() {
                    return;
                }
                (doc.id().to_string(), doc.take_outbound())
            };

            match outbound {
                Ok(Some(update)) => {
                    let message = Message::Update {
                        document_id: document_id.clone(),
                        update,
                    };
                    if let Err(e) = transport.broadcast(message).await {
                        tracing::warn!(document = %document_id, error = %e, "failed to broadcast repair");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(document = %document_id, error = %e, "failed to encode repair")
                }
            }
        });
        Self { handle }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for DuplicationWatchdog {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_exact_halves() {
        let text = "The quick brown fox. The quick brown fox. ";
        assert_eq!(detect_duplication(text, 20), Some(21));
    }

    #[test]
    fn test_ignores_short_or_uneven_text() {
        assert_eq!(detect_duplication("abab", 20), None);
        assert_eq!(detect_duplication("abab", 3), Some(2));
        assert_eq!(detect_duplication("abcab", 3), None);
        assert_eq!(detect_duplication("", 0), None);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        assert_eq!(detect_duplication("żółwżółw", 4), Some(4));
        assert_eq!(detect_duplication("żółwżółx", 4), None);
    }
}
