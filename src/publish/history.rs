//! Bounded per-topic publish history
//!
//! Most-recent-first, exact-string dedup with move-to-front, bounded length.
//! Only manual publishes are recorded; continuous-publish ticks bypass it.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct PublishHistory {
    limit: usize,
    entries: HashMap<String, Vec<String>>,
}

impl PublishHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            entries: HashMap::new(),
        }
    }

    /// Record a published payload. A payload already present moves to the
    /// front without growing the list.
    pub fn record(&mut self, topic: &str, payload: &str) {
        let list = self.entries.entry(topic.to_string()).or_default();
        if let Some(pos) = list.iter().position(|p| p == payload) {
            list.remove(pos);
        }
        list.insert(0, payload.to_string());
        list.truncate(self.limit);
    }

    pub fn for_topic(&self, topic: &str) -> Vec<String> {
        self.entries.get(topic).cloned().unwrap_or_default()
    }

    pub fn topics(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Plain-data snapshot for the prefs store
    pub fn snapshot(&self) -> HashMap<String, Vec<String>> {
        self.entries.clone()
    }

    /// Restore from a prefs snapshot, re-applying the bound
    pub fn restore(&mut self, snapshot: HashMap<String, Vec<String>>) {
        self.entries = snapshot;
        for list in self.entries.values_mut() {
            list.truncate(self.limit);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
