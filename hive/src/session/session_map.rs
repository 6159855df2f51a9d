//! The conversation → external-session-id map, persisted to
//! `session-map.json` so subprocesses can be resumed across restarts.
//!
//! Every write is a read-modify-write under one mutex and lands on disk
//! via an atomic rename, so concurrent senders never lose updates.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::fsutil::write_atomic;

pub struct SessionMap {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl SessionMap {
    /// Loads the map from disk. A missing file starts empty; a corrupt one
    /// is logged and abandoned (resumability is best-effort after a bad
    /// shutdown). Empty session ids are dropped on load.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(map) => map.into_iter().filter(|(_, v)| !v.is_empty()).collect(),
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "corrupt session map, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn get(&self, conversation_id: &str) -> Option<String> {
        self.entries
            .lock()
            .expect("session map lock")
            .get(conversation_id)
            .cloned()
    }

    /// Binds a conversation to an external session id and persists the
    /// whole map before returning. Empty ids are rejected: the invariant is
    /// that every stored value is a non-empty string.
    pub fn insert(&self, conversation_id: &str, session_id: &str) -> std::io::Result<()> {
        if session_id.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty session id",
            ));
        }
        let mut entries = self.entries.lock().expect("session map lock");
        entries.insert(conversation_id.to_string(), session_id.to_string());
        self.persist(&entries)
    }

    pub fn remove(&self, conversation_id: &str) -> std::io::Result<()> {
        let mut entries = self.entries.lock().expect("session map lock");
        if entries.remove(conversation_id).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("session map lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, entries: &HashMap<String, String>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        write_atomic(&self.path, &json)
    }
}
