//! Full-loop smoke test: adapter inbound → router → session manager →
//! mock LLM → adapter outbound, wired by the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use hive::channel::{ChannelAdapter, InboundMessage, MockAdapter};
use hive::session::MockRunner;
use hive::Orchestrator;

fn test_config() -> config::Config {
    config::load_str(
        r#"{
            "version": 5,
            "agents": {
                "jarvis": { "name": "Jarvis", "toolPreset": "messaging" },
                "work": { "name": "Work" }
            },
            "routing": { "defaultAgent": "work", "rules": [] }
        }"#,
    )
    .unwrap()
}

async fn wait_for_send(adapter: &MockAdapter) -> Vec<(String, String, Option<String>)> {
    for _ in 0..100 {
        let sent = adapter.sent();
        if !sent.is_empty() {
            return sent;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no outbound message arrived");
}

#[tokio::test]
async fn inbound_message_round_trips_to_the_channel() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::new());
    runner.push_text("At your service.");

    let orchestrator = Orchestrator::start(dir.path(), test_config(), runner.clone())
        .await
        .unwrap();

    let adapter = Arc::new(MockAdapter::new("web"));
    orchestrator.register_adapter(adapter.clone()).await;
    assert!(adapter.is_connected());

    adapter
        .push_inbound(InboundMessage::new("web", "u1", "@jarvis are you there?"))
        .await;

    let sent = wait_for_send(&adapter).await;
    assert_eq!(sent[0].0, "u1");
    assert_eq!(sent[0].1, "At your service.");

    // The mention routed to jarvis with the token stripped.
    let request = &runner.requests()[0];
    assert_eq!(request.agent_id, "jarvis");
    assert_eq!(request.prompt, "are you there?");

    // The conversation landed under the DM session key.
    let row = orchestrator
        .sessions()
        .session_status("web:u1:jarvis")
        .await
        .unwrap();
    assert_eq!(row.agent_id, "jarvis");

    orchestrator.shutdown();
}

#[tokio::test]
async fn agent_layouts_exist_after_start() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::start(
        dir.path(),
        test_config(),
        Arc::new(MockRunner::new()),
    )
    .await
    .unwrap();

    for slug in ["jarvis", "work"] {
        assert!(orchestrator.registry().soul_path(slug).exists());
        assert!(orchestrator.registry().memory_path(slug).exists());
        assert!(orchestrator.registry().heartbeat_path(slug).exists());
    }
    assert!(dir.path().join("orchestrator.db").exists());
    assert!(orchestrator.data_root().join(format!("ipc-{}.sock", std::process::id())).exists());

    orchestrator.shutdown();
    assert!(!dir
        .path()
        .join(format!("ipc-{}.sock", std::process::id()))
        .exists());
}

#[tokio::test]
async fn stale_sockets_are_cleaned_at_boot() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("ipc-99999.sock"), "").unwrap();

    let orchestrator = Orchestrator::start(
        dir.path(),
        test_config(),
        Arc::new(MockRunner::new()),
    )
    .await
    .unwrap();

    assert!(!dir.path().join("ipc-99999.sock").exists());
    orchestrator.shutdown();
}

#[tokio::test]
async fn unrouted_messages_fall_back_to_the_default_agent() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::new());
    runner.push_text("default here");

    let orchestrator = Orchestrator::start(dir.path(), test_config(), runner.clone())
        .await
        .unwrap();
    let adapter = Arc::new(MockAdapter::new("web"));
    orchestrator.register_adapter(adapter.clone()).await;

    adapter
        .push_inbound(InboundMessage::new("web", "someone", "plain message"))
        .await;
    wait_for_send(&adapter).await;

    assert_eq!(runner.requests()[0].agent_id, "work");
    orchestrator.shutdown();
}
