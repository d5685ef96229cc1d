//! Persisted client preferences
//!
//! Simple JSON file key-value store for state that outlives a session: the
//! last broker URL, the topic-prefix filter, publish history, and UI
//! theme/model choices. No core logic depends on it; a missing or
//! unreadable file just yields defaults.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Persisted preference values
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Prefs {
    pub last_broker_url: Option<String>,
    pub topic_prefix: Option<String>,
    #[serde(default)]
    pub publish_history: HashMap<String, Vec<String>>,
    pub theme: Option<String>,
    pub model: Option<String>,
}

/// File-backed preference store
#[derive(Debug)]
pub struct PrefsStore {
    path: PathBuf,
    prefs: Prefs,
}

impl PrefsStore {
    /// Load preferences from `path`. A missing file yields defaults; a
    /// malformed file is logged and replaced with defaults on next save.
    pub fn load(path: &Path) -> Self {
        let prefs = match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(prefs) => prefs,
                Err(e) => {
                    warn!("Ignoring malformed prefs file {}: {}", path.display(), e);
                    Prefs::default()
                }
            },
            Err(_) => Prefs::default(),
        };

        Self {
            path: path.to_path_buf(),
            prefs,
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let contents = serde_json::to_string_pretty(&self.prefs)?;
        fs::write(&self.path, contents)
    }

    pub fn prefs(&self) -> &Prefs {
        &self.prefs
    }

    pub fn set_last_broker_url(&mut self, url: &str) {
        self.prefs.last_broker_url = Some(url.to_string());
    }

    pub fn set_topic_prefix(&mut self, prefix: Option<String>) {
        self.prefs.topic_prefix = prefix;
    }

    pub fn set_publish_history(&mut self, history: HashMap<String, Vec<String>>) {
        self.prefs.publish_history = history;
    }

    pub fn set_theme(&mut self, theme: Option<String>) {
        self.prefs.theme = theme;
    }

    pub fn set_model(&mut self, model: Option<String>) {
        self.prefs.model = model;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let store = PrefsStore::load(&dir.path().join("nope.json"));
        assert_eq!(store.prefs(), &Prefs::default());
    }

    #[test]
    fn save_and_reload_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/prefs.json");

        let mut store = PrefsStore::load(&path);
        store.set_last_broker_url("mqtt://broker:1883");
        store.set_topic_prefix(Some("plant".to_string()));
        store.set_theme(Some("dark".to_string()));
        let mut history = HashMap::new();
        history.insert("t".to_string(), vec!["1".to_string(), "2".to_string()]);
        store.set_publish_history(history.clone());
        store.save().unwrap();

        let reloaded = PrefsStore::load(&path);
        assert_eq!(
            reloaded.prefs().last_broker_url.as_deref(),
            Some("mqtt://broker:1883")
        );
        assert_eq!(reloaded.prefs().topic_prefix.as_deref(), Some("plant"));
        assert_eq!(reloaded.prefs().theme.as_deref(), Some("dark"));
        assert_eq!(reloaded.prefs().publish_history, history);
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "{ this is not json").unwrap();

        let store = PrefsStore::load(&path);
        assert_eq!(store.prefs(), &Prefs::default());
    }
}
