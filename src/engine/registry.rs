//! Topic registry
//!
//! Tracks every topic observed since connection in first-seen order, counts
//! messages per topic, and merges device discovery announcements published
//! under the discovery namespace. A malformed announcement is logged and
//! skipped; discovery must never take the registry down.

use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// One observed topic
#[derive(Debug, Clone, PartialEq)]
pub struct TopicEntry {
    pub name: String,
    pub first_seen_order: usize,
    pub message_count: u64,
}

/// Retained discovery payload: `{"topics": ["devices/abc/led/command", ...]}`
#[derive(Debug, Deserialize)]
struct DiscoveryAnnouncement {
    topics: Vec<String>,
}

/// Display grouping derived from the registry (not a data-model invariant)
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayGroup {
    /// A topic whose first segment it shares with no other topic
    Flat(String),
    /// Topics grouped under their common first path segment
    Group { label: String, topics: Vec<String> },
}

/// Ordered, deduplicated set of topics observed within one session
#[derive(Debug)]
pub struct TopicRegistry {
    topics: Vec<TopicEntry>,
    index: HashMap<String, usize>,
    revision: u64,
    discovery_namespace: String,
}

impl TopicRegistry {
    pub fn new(discovery_namespace: &str) -> Self {
        Self {
            topics: Vec::new(),
            index: HashMap::new(),
            revision: 0,
            discovery_namespace: discovery_namespace.trim_end_matches('/').to_string(),
        }
    }

    /// Record a topic. Idempotent: an already-known topic changes nothing.
    /// Returns true when the topic was new.
    pub fn observe(&mut self, topic: &str) -> bool {
        if self.index.contains_key(topic) {
            return false;
        }
        let order = self.topics.len();
        self.topics.push(TopicEntry {
            name: topic.to_string(),
            first_seen_order: order,
            message_count: 0,
        });
        self.index.insert(topic.to_string(), order);
        self.revision += 1;
        true
    }

    /// Process one inbound message: discovery announcements merge their
    /// declared topics; everything else is observed and counted.
    pub fn handle_message(&mut self, topic: &str, payload: &str) {
        if self.in_discovery_namespace(topic) {
            self.merge_announcement(topic, payload);
            return;
        }

        self.observe(topic);
        if let Some(&i) = self.index.get(topic) {
            self.topics[i].message_count += 1;
        }
    }

    fn in_discovery_namespace(&self, topic: &str) -> bool {
        topic == self.discovery_namespace
            || topic.starts_with(&format!("{}/", self.discovery_namespace))
    }

    /// Merge a discovery announcement into the registry. The announcement
    /// declares the topics a device exposes; the announcement topic itself
    /// is not listed.
    fn merge_announcement(&mut self, announcement_topic: &str, payload: &str) {
        match serde_json::from_str::<DiscoveryAnnouncement>(payload) {
            Ok(announcement) => {
                for declared in &announcement.topics {
                    if self.observe(declared) {
                        debug!(target: "registry", "Discovered topic: {}", declared);
                    }
                }
            }
            Err(e) => {
                warn!(
                    "Ignoring malformed discovery announcement on {}: {}",
                    announcement_topic, e
                );
            }
        }
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.index.contains_key(topic)
    }

    pub fn topics(&self) -> &[TopicEntry] {
        &self.topics
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Bumped whenever the topic set changes; drives re-render
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn message_count(&self, topic: &str) -> u64 {
        self.index
            .get(topic)
            .map(|&i| self.topics[i].message_count)
            .unwrap_or(0)
    }

    /// Clear the registry (session teardown)
    pub fn clear(&mut self) {
        if !self.topics.is_empty() {
            self.topics.clear();
            self.index.clear();
            self.revision += 1;
        }
    }

    /// Group topics by their first path segment for display. Groups with a
    /// single member stay flat. Group order follows first-seen order.
    pub fn grouped(&self) -> Vec<DisplayGroup> {
        let mut group_order: Vec<String> = Vec::new();
        let mut members: HashMap<String, Vec<String>> = HashMap::new();

        for entry in &self.topics {
            let segment = entry
                .name
                .split('/')
                .next()
                .unwrap_or(entry.name.as_str())
                .to_string();
            if !members.contains_key(&segment) {
                group_order.push(segment.clone());
            }
            members.entry(segment).or_default().push(entry.name.clone());
        }

        group_order
            .into_iter()
            .map(|label| {
                let topics = members.remove(&label).unwrap_or_default();
                if topics.len() == 1 {
                    DisplayGroup::Flat(topics.into_iter().next().unwrap_or_default())
                } else {
                    DisplayGroup::Group { label, topics }
                }
            })
            .collect()
    }
}
