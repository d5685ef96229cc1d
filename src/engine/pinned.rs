//! Pinned live-value cache
//!
//! A small set of topics whose most recent payload is tracked continuously,
//! regardless of what the UI currently displays. Pins are connection-scoped
//! and cleared on any connection loss.

use tracing::debug;

/// One pinned topic and its freshest payload
#[derive(Debug, Clone, PartialEq)]
pub struct PinnedTopic {
    pub topic: String,
    pub last_payload: Option<String>,
}

/// Pin set in pin order
#[derive(Debug, Default)]
pub struct PinnedCache {
    entries: Vec<PinnedTopic>,
}

impl PinnedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin a topic. Returns false (no-op) if already pinned.
    pub fn pin(&mut self, topic: &str) -> bool {
        if self.entries.iter().any(|e| e.topic == topic) {
            return false;
        }
        self.entries.push(PinnedTopic {
            topic: topic.to_string(),
            last_payload: None,
        });
        debug!(target: "pinned", "Pinned topic: {}", topic);
        true
    }

    /// Unpin a topic. Safe if not pinned; returns whether a pin was removed.
    pub fn unpin(&mut self, topic: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.topic != topic);
        self.entries.len() != before
    }

    /// Refresh the cached payload for a pinned topic
    pub fn on_message(&mut self, topic: &str, payload: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.topic == topic) {
            entry.last_payload = Some(payload.to_string());
        }
    }

    pub fn is_pinned(&self, topic: &str) -> bool {
        self.entries.iter().any(|e| e.topic == topic)
    }

    pub fn last_payload(&self, topic: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.topic == topic)
            .and_then(|e| e.last_payload.as_deref())
    }

    pub fn snapshot(&self) -> Vec<PinnedTopic> {
        self.entries.clone()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_is_a_noop_when_already_pinned() {
        let mut cache = PinnedCache::new();
        assert!(cache.pin("a/b"));
        assert!(!cache.pin("a/b"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn unpin_is_safe_when_not_pinned() {
        let mut cache = PinnedCache::new();
        assert!(!cache.unpin("never/pinned"));
        cache.pin("a/b");
        assert!(cache.unpin("a/b"));
        assert!(cache.is_empty());
    }

    #[test]
    fn messages_refresh_pinned_payloads_only() {
        let mut cache = PinnedCache::new();
        cache.pin("a/b");

        cache.on_message("a/b", "42");
        cache.on_message("c/d", "ignored");

        assert_eq!(cache.last_payload("a/b"), Some("42"));
        assert_eq!(cache.last_payload("c/d"), None);

        cache.on_message("a/b", "43");
        assert_eq!(cache.last_payload("a/b"), Some("43"));
    }

    #[test]
    fn new_pin_starts_with_no_payload() {
        let mut cache = PinnedCache::new();
        cache.pin("a/b");
        assert!(cache.is_pinned("a/b"));
        assert_eq!(cache.last_payload("a/b"), None);
        assert_eq!(
            cache.snapshot(),
            vec![PinnedTopic {
                topic: "a/b".to_string(),
                last_payload: None
            }]
        );
    }

    #[test]
    fn clear_removes_all_pins() {
        let mut cache = PinnedCache::new();
        cache.pin("a/b");
        cache.pin("c/d");
        cache.on_message("a/b", "1");

        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.is_pinned("a/b"));
    }
}
