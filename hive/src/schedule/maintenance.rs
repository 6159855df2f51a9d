//! Daily memory maintenance: consolidation, archival, and incremental
//! reindex per agent.
//!
//! Runs on each agent's reflection interval (in days, default 1). Every
//! step is best-effort: a failure is logged and the remaining steps still
//! run, and nothing here blocks the request paths.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::activity::ActivityLog;
use crate::memory::{
    archive_memory, consolidate, Embedder, MemoryStore, DEFAULT_ARCHIVE_THRESHOLD,
    DEFAULT_LOOKBACK_DAYS,
};
use crate::registry::AgentRegistry;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

pub struct MemoryMaintenance {
    registry: Arc<AgentRegistry>,
    activity: Arc<ActivityLog>,
    embedder: Option<Arc<dyn Embedder>>,
    timers: Mutex<HashMap<String, CancellationToken>>,
    cancel: CancellationToken,
}

impl MemoryMaintenance {
    pub fn new(
        registry: Arc<AgentRegistry>,
        activity: Arc<ActivityLog>,
        embedder: Option<Arc<dyn Embedder>>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            activity,
            embedder,
            timers: Mutex::new(HashMap::new()),
            cancel,
        })
    }

    /// Starts one timer per registered agent, spaced by the agent's
    /// reflection interval in days (default 1).
    pub fn start(self: &Arc<Self>) {
        for slug in self.registry.list() {
            let days = self
                .registry
                .get(&slug)
                .ok()
                .and_then(|agent| agent.reflection_interval_days)
                .unwrap_or(1)
                .max(1);
            self.start_agent(&slug, days);
        }
    }

    fn start_agent(self: &Arc<Self>, slug: &str, interval_days: u32) {
        let token = self.cancel.child_token();
        self.timers
            .lock()
            .expect("maintenance lock")
            .insert(slug.to_string(), token.clone());

        let this = Arc::clone(self);
        let slug = slug.to_string();
        let interval = DAY * interval_days;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        this.run_once(&slug).await;
                    }
                }
            }
        });
    }

    pub fn stop_all(&self) {
        let mut timers = self.timers.lock().expect("maintenance lock");
        for (_, token) in timers.drain() {
            token.cancel();
        }
    }

    /// One maintenance pass: consolidate recent daily logs, archive an
    /// oversized `MEMORY.md`, then reindex the agent's markdown.
    pub async fn run_once(&self, slug: &str) {
        let agent_root = self.registry.agent_dir(slug);
        let today = chrono::Utc::now().date_naive();

        match consolidate(&agent_root, DEFAULT_LOOKBACK_DAYS, today) {
            Ok(report) if report.facts_added > 0 => {
                self.activity.record(
                    slug,
                    "memory.consolidate",
                    format!(
                        "{} facts added from {} days",
                        report.facts_added, report.days_processed
                    ),
                );
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(agent = %slug, error = %e, "consolidation failed"),
        }

        match archive_memory(&agent_root, DEFAULT_ARCHIVE_THRESHOLD, today) {
            Ok(report) if report.archived => {
                self.activity.record(
                    slug,
                    "memory.archive",
                    format!(
                        "{} sections archived, {} bytes kept",
                        report.sections_archived, report.new_size
                    ),
                );
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(agent = %slug, error = %e, "archival failed"),
        }

        let store = match MemoryStore::open(
            self.registry.memory_db_path(slug),
            &agent_root,
            self.embedder.clone(),
        ) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(agent = %slug, error = %e, "memory store open failed");
                return;
            }
        };
        match store.reindex_all().await {
            Ok(report) => {
                if report.files_indexed > 0 || report.files_removed > 0 {
                    self.activity.record(
                        slug,
                        "memory.reindex",
                        format!(
                            "{} indexed, {} removed, {} unchanged",
                            report.files_indexed, report.files_removed, report.files_skipped
                        ),
                    );
                }
            }
            Err(e) => tracing::warn!(agent = %slug, error = %e, "reindex failed"),
        }
    }
}
