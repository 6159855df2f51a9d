//! Shared test harness: a data root in a tempdir with a registry, an
//! in-memory store, a mock runner, and a session manager wired together.

use std::collections::BTreeMap;
use std::sync::Arc;

use config::AgentConfig;
use hive::activity::ActivityLog;
use hive::channel::Channels;
use hive::registry::AgentRegistry;
use hive::session::{MockRunner, SessionManager};
use hive::store::Store;
use hive::toolserver::ToolServerSupervisor;

#[allow(dead_code)]
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub registry: Arc<AgentRegistry>,
    pub store: Arc<Store>,
    pub runner: Arc<MockRunner>,
    pub sessions: Arc<SessionManager>,
    pub channels: Arc<Channels>,
    pub activity: Arc<ActivityLog>,
}

#[allow(dead_code)]
pub fn harness(slugs: &[&str]) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().to_path_buf();

    let mut agents = BTreeMap::new();
    for slug in slugs {
        agents.insert(slug.to_string(), AgentConfig::default());
    }
    let registry = Arc::new(AgentRegistry::new(&root, agents).expect("registry"));
    let store = Arc::new(Store::open_in_memory().expect("store"));
    let runner = Arc::new(MockRunner::new());
    let supervisor = Arc::new(ToolServerSupervisor::new(
        &root,
        BTreeMap::new(),
        root.join("ipc-test.sock"),
    ));
    let activity = Arc::new(ActivityLog::new(root.join("activity.jsonl")));
    let sessions = Arc::new(SessionManager::new(
        &root,
        Arc::clone(&registry),
        Arc::clone(&store),
        runner.clone(),
        supervisor,
        Arc::clone(&activity),
    ));
    let channels = Arc::new(Channels::new());

    Harness {
        dir,
        registry,
        store,
        runner,
        sessions,
        channels,
        activity,
    }
}
