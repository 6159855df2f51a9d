//! Append-only activity feed at `<root>/activity.jsonl`.
//!
//! One JSON object per line: what happened, for which agent, when.
//! Writing is best-effort; a failed append is logged and never fails the
//! operation that produced the entry.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::fsutil::iso_now;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub timestamp: String,
    pub agent_id: String,
    /// e.g. `session.send`, `heartbeat.tick`, `ralph.iteration`.
    pub kind: String,
    pub detail: String,
}

pub struct ActivityLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ActivityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Appends one entry. Failures are logged, not propagated.
    pub fn record(&self, agent_id: &str, kind: &str, detail: impl Into<String>) {
        let entry = ActivityEntry {
            timestamp: iso_now(),
            agent_id: agent_id.to_string(),
            kind: kind.to_string(),
            detail: detail.into(),
        };
        let Ok(line) = serde_json::to_string(&entry) else {
            return;
        };
        let _guard = self.write_lock.lock().expect("activity lock");
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| {
                use std::io::Write;
                writeln!(f, "{}", line)
            });
        if let Err(e) = result {
            tracing::warn!(error = %e, "activity append failed");
        }
    }

    /// Reads back all entries (newest last). Unparseable lines are skipped.
    pub fn entries(&self) -> Vec<ActivityEntry> {
        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        raw.lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}
