//! Collaboration primitives: file-based delegations, pub/sub topics,
//! subscriptions, and read-only shared memory between agents.
//!
//! Everything lives under `<root>/collaborations/` as one file per record.
//! Writes that could race go through temp-file + atomic rename, and the
//! single shared file (`subscriptions.json`) is additionally serialized by
//! an in-process mutex.

mod delegations;
mod subscriptions;
mod topics;

use std::path::PathBuf;

pub use delegations::{Delegation, DelegationStatus, Delegations};
pub use subscriptions::{Subscription, Subscriptions};
pub use topics::{TopicMessage, Topics};

#[derive(Debug, thiserror::Error)]
pub enum CollabError {
    #[error("collaboration io: {0}")]
    Io(#[from] std::io::Error),
    #[error("collaboration record: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid topic name: {0}")]
    InvalidTopic(String),
    #[error("shared memory unavailable for {0}")]
    SharedMemoryUnavailable(String),
}

/// Entry point bundling the three collaboration stores plus shared-memory
/// access.
pub struct Collaboration {
    delegations: Delegations,
    topics: Topics,
    subscriptions: Subscriptions,
    agents_root: PathBuf,
}

impl Collaboration {
    /// `root` is the data root; state lands under `<root>/collaborations/`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let collab = root.join("collaborations");
        Self {
            delegations: Delegations::new(collab.join("delegations")),
            topics: Topics::new(collab.join("topics")),
            subscriptions: Subscriptions::new(collab.join("subscriptions.json")),
            agents_root: root.join("agents"),
        }
    }

    pub fn delegations(&self) -> &Delegations {
        &self.delegations
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    /// Returns the target agent's `MEMORY.md`, and only that file, iff
    /// both agent directories exist and the target has one.
    pub fn shared_memory(&self, requester: &str, target: &str) -> Result<String, CollabError> {
        let requester_dir = self.agents_root.join(requester);
        let target_dir = self.agents_root.join(target);
        if !requester_dir.is_dir() || !target_dir.is_dir() {
            return Err(CollabError::SharedMemoryUnavailable(target.to_string()));
        }
        let memory = target_dir.join("MEMORY.md");
        if !memory.is_file() {
            return Err(CollabError::SharedMemoryUnavailable(target.to_string()));
        }
        Ok(std::fs::read_to_string(memory)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_memory_reads_only_memory_md() {
        let dir = tempfile::tempdir().unwrap();
        let agents = dir.path().join("agents");
        std::fs::create_dir_all(agents.join("a")).unwrap();
        std::fs::create_dir_all(agents.join("b")).unwrap();
        std::fs::write(agents.join("b/MEMORY.md"), "# b memory\n").unwrap();
        std::fs::write(agents.join("b/SOUL.md"), "# b soul\n").unwrap();

        let collab = Collaboration::new(dir.path());
        let memory = collab.shared_memory("a", "b").unwrap();
        assert_eq!(memory, "# b memory\n");
        assert!(!memory.contains("soul"));
    }

    #[test]
    fn shared_memory_requires_both_agents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("agents/a")).unwrap();
        let collab = Collaboration::new(dir.path());
        assert!(matches!(
            collab.shared_memory("a", "ghost"),
            Err(CollabError::SharedMemoryUnavailable(_))
        ));
        assert!(matches!(
            collab.shared_memory("ghost", "a"),
            Err(CollabError::SharedMemoryUnavailable(_))
        ));
    }

    #[test]
    fn shared_memory_requires_memory_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("agents/a")).unwrap();
        std::fs::create_dir_all(dir.path().join("agents/b")).unwrap();
        let collab = Collaboration::new(dir.path());
        assert!(collab.shared_memory("a", "b").is_err());
    }
}
