//! Subscriptions: one shared JSON file listing `(agent, topic)` pairs.
//!
//! The file is a racy shared resource, so every mutation is a
//! read-modify-write under an async mutex and lands via atomic rename.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::CollabError;
use crate::fsutil::{iso_now, write_atomic};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub agent_id: String,
    pub topic: String,
    pub created_at: String,
}

pub struct Subscriptions {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl Subscriptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<Vec<Subscription>, CollabError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, subs: &[Subscription]) -> Result<(), CollabError> {
        write_atomic(&self.path, &serde_json::to_string_pretty(subs)?)?;
        Ok(())
    }

    /// Subscribes an agent to a topic. Idempotent on the `(agent, topic)`
    /// pair: repeated calls leave exactly one record.
    pub async fn subscribe(&self, agent_id: &str, topic: &str) -> Result<Subscription, CollabError> {
        let _guard = self.lock.lock().await;
        let mut subs = self.read_all()?;
        if let Some(existing) = subs
            .iter()
            .find(|s| s.agent_id == agent_id && s.topic == topic)
        {
            return Ok(existing.clone());
        }
        let subscription = Subscription {
            agent_id: agent_id.to_string(),
            topic: topic.to_string(),
            created_at: iso_now(),
        };
        subs.push(subscription.clone());
        self.write_all(&subs)?;
        Ok(subscription)
    }

    /// Removes the `(agent, topic)` pair if present.
    pub async fn unsubscribe(&self, agent_id: &str, topic: &str) -> Result<(), CollabError> {
        let _guard = self.lock.lock().await;
        let mut subs = self.read_all()?;
        let before = subs.len();
        subs.retain(|s| !(s.agent_id == agent_id && s.topic == topic));
        if subs.len() != before {
            self.write_all(&subs)?;
        }
        Ok(())
    }

    /// All subscriptions, optionally narrowed to one agent.
    pub async fn list(&self, agent_id: Option<&str>) -> Result<Vec<Subscription>, CollabError> {
        let _guard = self.lock.lock().await;
        let subs = self.read_all()?;
        Ok(match agent_id {
            Some(agent_id) => subs.into_iter().filter(|s| s.agent_id == agent_id).collect(),
            None => subs,
        })
    }

    /// Agents subscribed to one topic.
    pub async fn subscribers(&self, topic: &str) -> Result<Vec<String>, CollabError> {
        let _guard = self.lock.lock().await;
        let subs = self.read_all()?;
        Ok(subs
            .into_iter()
            .filter(|s| s.topic == topic)
            .map(|s| s.agent_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let subs = Subscriptions::new(dir.path().join("subscriptions.json"));
        subs.subscribe("jarvis", "deploys").await.unwrap();
        subs.subscribe("jarvis", "deploys").await.unwrap();
        subs.subscribe("jarvis", "deploys").await.unwrap();

        let all = subs.list(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].agent_id, "jarvis");
        assert_eq!(all[0].topic, "deploys");
    }

    #[tokio::test]
    async fn unsubscribe_removes_only_the_pair() {
        let dir = tempfile::tempdir().unwrap();
        let subs = Subscriptions::new(dir.path().join("subscriptions.json"));
        subs.subscribe("jarvis", "deploys").await.unwrap();
        subs.subscribe("jarvis", "alerts").await.unwrap();
        subs.subscribe("scout", "deploys").await.unwrap();

        subs.unsubscribe("jarvis", "deploys").await.unwrap();

        assert_eq!(subs.list(Some("jarvis")).await.unwrap().len(), 1);
        assert_eq!(subs.subscribers("deploys").await.unwrap(), vec!["scout"]);
    }

    #[tokio::test]
    async fn survives_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscriptions.json");
        Subscriptions::new(&path)
            .subscribe("a", "t")
            .await
            .unwrap();
        let reloaded = Subscriptions::new(&path);
        assert_eq!(reloaded.list(None).await.unwrap().len(), 1);
    }
}
