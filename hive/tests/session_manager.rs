//! Session manager behavior: resume mapping, crash-restart persistence,
//! per-conversation serialization, and failure handling.

mod common;

use hive::session::{RunOutcome, SendOptions, SessionError};
use hive::store::SessionStatus;

fn opts(conversation_id: &str) -> SendOptions {
    SendOptions {
        conversation_id: Some(conversation_id.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn send_persists_session_map_and_row() {
    let h = common::harness(&["jarvis"]);

    let outcome = h
        .sessions
        .send_message("jarvis", "hello", opts("web:u1:jarvis"))
        .await
        .unwrap();
    assert_eq!(outcome.conversation_id, "web:u1:jarvis");
    assert!(outcome.session_id.is_some());

    // The dedicated JSON file holds the mapping with a non-empty value.
    let raw =
        std::fs::read_to_string(h.dir.path().join("session-map.json")).unwrap();
    let map: std::collections::HashMap<String, String> = serde_json::from_str(&raw).unwrap();
    assert_eq!(
        map.get("web:u1:jarvis"),
        outcome.session_id.as_ref(),
    );
    assert!(!map["web:u1:jarvis"].is_empty());

    let row = h.sessions.session_status("web:u1:jarvis").await.unwrap();
    assert_eq!(row.agent_id, "jarvis");
    assert_eq!(row.turn_count, 1);
    assert_eq!(row.status, SessionStatus::Active);
}

#[tokio::test]
async fn second_send_resumes_the_external_session() {
    let h = common::harness(&["jarvis"]);
    h.runner.push_outcome(RunOutcome {
        session_id: Some("ext-1".into()),
        text: "first".into(),
        steps: Vec::new(),
    });

    h.sessions
        .send_message("jarvis", "one", opts("c1"))
        .await
        .unwrap();
    h.sessions.resume_session("c1", "two").await.unwrap();

    let requests = h.runner.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].resume_session_id, None);
    assert_eq!(requests[1].resume_session_id.as_deref(), Some("ext-1"));

    let row = h.sessions.session_status("c1").await.unwrap();
    assert_eq!(row.turn_count, 2);
}

#[tokio::test]
async fn failed_resume_falls_back_to_fresh_and_overwrites() {
    let h = common::harness(&["jarvis"]);
    h.runner.push_outcome(RunOutcome {
        session_id: Some("ext-old".into()),
        text: "first".into(),
        steps: Vec::new(),
    });
    h.sessions
        .send_message("jarvis", "one", opts("c1"))
        .await
        .unwrap();

    // The resume attempt dies; the fresh retry succeeds.
    h.runner.push_failure("session expired");
    h.runner.push_outcome(RunOutcome {
        session_id: Some("ext-new".into()),
        text: "recovered".into(),
        steps: Vec::new(),
    });

    let outcome = h.sessions.resume_session("c1", "two").await.unwrap();
    assert_eq!(outcome.text, "recovered");
    assert_eq!(
        h.sessions.external_session_id("c1").as_deref(),
        Some("ext-new")
    );

    let requests = h.runner.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1].resume_session_id.as_deref(), Some("ext-old"));
    assert_eq!(requests[2].resume_session_id, None);
}

#[tokio::test]
async fn fresh_spawn_failure_leaves_session_untouched() {
    let h = common::harness(&["jarvis"]);
    h.runner.push_failure("binary not found");

    let result = h.sessions.send_message("jarvis", "hi", opts("c1")).await;
    assert!(matches!(result, Err(SessionError::Spawn { .. })));

    assert!(h.sessions.external_session_id("c1").is_none());
    assert!(matches!(
        h.sessions.session_status("c1").await,
        Err(SessionError::NotFound(_))
    ));
}

#[tokio::test]
async fn unknown_agent_fails_loudly() {
    let h = common::harness(&["jarvis"]);
    let result = h.sessions.send_message("ghost", "hi", opts("c1")).await;
    assert!(matches!(result, Err(SessionError::Agent(_))));
}

#[tokio::test]
async fn unknown_conversation_cannot_be_resumed() {
    let h = common::harness(&["jarvis"]);
    assert!(matches!(
        h.sessions.resume_session("nope", "hi").await,
        Err(SessionError::NotFound(_))
    ));
}

#[tokio::test]
async fn concurrent_sends_to_one_conversation_serialize() {
    let h = common::harness(&["jarvis"]);

    let a = h.sessions.send_message("jarvis", "first", opts("c1"));
    let b = h.sessions.send_message("jarvis", "second", opts("c1"));
    let (ra, rb) = tokio::join!(a, b);
    ra.unwrap();
    rb.unwrap();

    // Both landed, in issue order, one at a time.
    let row = h.sessions.session_status("c1").await.unwrap();
    assert_eq!(row.turn_count, 2);
    let prompts: Vec<String> = h.runner.requests().iter().map(|r| r.prompt.clone()).collect();
    assert_eq!(prompts, vec!["first".to_string(), "second".to_string()]);
}

#[tokio::test]
async fn system_prompt_carries_soul_and_memory() {
    let h = common::harness(&["jarvis"]);
    std::fs::write(h.registry.soul_path("jarvis"), "# Soul\nI am Jarvis.\n").unwrap();
    std::fs::write(
        h.registry.memory_path("jarvis"),
        "# Memory\n- **User prefers dark mode**\n",
    )
    .unwrap();

    h.sessions
        .send_message(
            "jarvis",
            "hi",
            SendOptions {
                conversation_id: Some("c1".into()),
                channel: Some("slack".into()),
                user_context: Some("Channel: slack. User: u1.".into()),
            },
        )
        .await
        .unwrap();

    let request = &h.runner.requests()[0];
    assert!(request.system_prompt.contains("I am Jarvis."));
    assert!(request.system_prompt.contains("User prefers dark mode"));
    assert!(request.system_prompt.contains("Channel: slack"));
}

#[tokio::test]
async fn session_map_survives_manager_restart() {
    let h = common::harness(&["jarvis"]);
    h.runner.push_outcome(RunOutcome {
        session_id: Some("ext-persisted".into()),
        text: "ok".into(),
        steps: Vec::new(),
    });
    h.sessions
        .send_message("jarvis", "hi", opts("c1"))
        .await
        .unwrap();

    // A second manager over the same root sees the mapping.
    let reloaded = hive::session::SessionMap::load(h.dir.path().join("session-map.json"));
    assert_eq!(reloaded.get("c1").as_deref(), Some("ext-persisted"));
}
