//! Delegations: one JSON file per inter-agent assignment, single writer,
//! many readers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::CollabError;
use crate::fsutil::{iso_now, write_atomic};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationStatus {
    Pending,
    Accepted,
    InProgress,
    Completed,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delegation {
    pub id: String,
    pub from: String,
    pub to: String,
    pub task: String,
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<String>,
    pub status: DelegationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct Delegations {
    dir: PathBuf,
}

impl Delegations {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Creates a pending delegation and writes its file.
    pub fn create(
        &self,
        from: &str,
        to: &str,
        task: &str,
        context: &str,
        constraints: Option<String>,
    ) -> Result<Delegation, CollabError> {
        let now = iso_now();
        let delegation = Delegation {
            id: uuid::Uuid::new_v4().to_string(),
            from: from.to_string(),
            to: to.to_string(),
            task: task.to_string(),
            context: context.to_string(),
            constraints,
            status: DelegationStatus::Pending,
            result: None,
            created_at: now.clone(),
            updated_at: now,
        };
        self.persist(&delegation)?;
        Ok(delegation)
    }

    pub fn get(&self, id: &str) -> Result<Delegation, CollabError> {
        let raw = std::fs::read_to_string(self.path(id))
            .map_err(|_| CollabError::NotFound(format!("delegation: {}", id)))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Advances a delegation's status (and optionally its result), bumping
    /// `updated_at` strictly past the previous timestamp.
    pub fn update(
        &self,
        id: &str,
        status: DelegationStatus,
        result: Option<String>,
    ) -> Result<Delegation, CollabError> {
        let mut delegation = self.get(id)?;
        delegation.status = status;
        if result.is_some() {
            delegation.result = result;
        }
        let mut stamp = iso_now();
        // Millisecond clocks can tie with created_at on fast updates.
        if stamp <= delegation.updated_at {
            stamp = bump_millis(&delegation.updated_at).unwrap_or(stamp);
        }
        delegation.updated_at = stamp;
        self.persist(&delegation)?;
        Ok(delegation)
    }

    /// Lists all delegations, optionally filtered by recipient and status.
    /// The scan is a directory walk; filters apply in memory.
    pub fn list(
        &self,
        to: Option<&str>,
        status: Option<DelegationStatus>,
    ) -> Result<Vec<Delegation>, CollabError> {
        let mut out = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(raw) = std::fs::read_to_string(&path) else {
                continue;
            };
            let Ok(delegation) = serde_json::from_str::<Delegation>(&raw) else {
                tracing::warn!(path = %path.display(), "skipping unreadable delegation file");
                continue;
            };
            if let Some(to) = to {
                if delegation.to != to {
                    continue;
                }
            }
            if let Some(status) = status {
                if delegation.status != status {
                    continue;
                }
            }
            out.push(delegation);
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    fn persist(&self, delegation: &Delegation) -> Result<(), CollabError> {
        let json = serde_json::to_string_pretty(delegation)?;
        write_atomic(&self.path(&delegation.id), &json)?;
        Ok(())
    }
}

/// Adds one millisecond to an ISO-8601 timestamp string.
fn bump_millis(iso: &str) -> Option<String> {
    let parsed = chrono::DateTime::parse_from_rfc3339(iso).ok()?;
    let bumped = parsed + chrono::Duration::milliseconds(1);
    Some(
        bumped
            .with_timezone(&chrono::Utc)
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    )
}
