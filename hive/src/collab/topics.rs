//! Topics: append-only pub/sub as one file per message under
//! `topics/<topic>/`.
//!
//! File names are `<sanitized-iso-timestamp>-<id>.json`; ISO-8601 UTC
//! timestamps sort lexicographically, so directory order is publish order.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::CollabError;
use crate::fsutil::{iso_now, write_atomic};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicMessage {
    pub id: String,
    pub topic: String,
    pub sender: String,
    pub payload: Value,
    pub timestamp: String,
}

fn topic_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("topic name regex"))
}

/// Timestamp characters unsafe in file names become hyphens.
fn sanitize_timestamp(ts: &str) -> String {
    ts.replace([':', '.'], "-")
}

pub struct Topics {
    dir: PathBuf,
}

impl Topics {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn topic_dir(&self, topic: &str) -> Result<PathBuf, CollabError> {
        if !topic_re().is_match(topic) {
            return Err(CollabError::InvalidTopic(topic.to_string()));
        }
        Ok(self.dir.join(topic))
    }

    /// Publishes one message; the file is never rewritten afterwards.
    pub fn publish(
        &self,
        topic: &str,
        sender: &str,
        payload: Value,
    ) -> Result<TopicMessage, CollabError> {
        let message = TopicMessage {
            id: uuid::Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            sender: sender.to_string(),
            payload,
            timestamp: iso_now(),
        };
        let dir = self.topic_dir(topic)?;
        std::fs::create_dir_all(&dir)?;
        let name = format!("{}-{}.json", sanitize_timestamp(&message.timestamp), message.id);
        write_atomic(&dir.join(name), &serde_json::to_string_pretty(&message)?)?;
        Ok(message)
    }

    /// Messages of a topic in timestamp order. With `since`, only messages
    /// strictly after that timestamp string are returned; a message whose
    /// timestamp equals `since` is filtered out.
    pub fn get_messages(
        &self,
        topic: &str,
        since: Option<&str>,
    ) -> Result<Vec<TopicMessage>, CollabError> {
        let dir = self.topic_dir(topic)?;
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(raw) = std::fs::read_to_string(&path) else {
                continue;
            };
            let Ok(message) = serde_json::from_str::<TopicMessage>(&raw) else {
                tracing::warn!(path = %path.display(), "skipping unreadable topic message");
                continue;
            };
            if let Some(since) = since {
                if message.timestamp.as_str() <= since {
                    continue;
                }
            }
            out.push(message);
        }
        out.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(out)
    }

    /// Topic names that currently have a directory.
    pub fn list_topics(&self) -> Result<Vec<String>, CollabError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                out.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        out.sort();
        Ok(out)
    }
}
