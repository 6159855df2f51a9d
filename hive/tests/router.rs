//! Router resolution order and session-key synthesis.

use std::sync::Arc;

use config::RoutingRule;
use hive::channel::InboundMessage;
use hive::router::Router;
use hive::store::{Store, UserMapping};

fn rule(channel: &str, agent: &str) -> RoutingRule {
    RoutingRule {
        channel: channel.to_string(),
        channel_user_id: None,
        chat_id: None,
        agent_id: agent.to_string(),
    }
}

fn router_with(
    agents: &[&str],
    rules: Vec<RoutingRule>,
    default_agent: Option<&str>,
    store: Arc<Store>,
) -> Router {
    Router::new(
        agents.iter().map(|s| s.to_string()),
        rules,
        default_agent.map(String::from),
        store,
    )
}

#[tokio::test]
async fn mention_beats_rule() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let router = router_with(
        &["jarvis", "work"],
        vec![rule("slack", "work")],
        Some("work"),
        store,
    );

    let msg = InboundMessage::new("slack", "u1", "@jarvis deploy to prod");
    let decision = router.route(&msg).await.unwrap();
    assert_eq!(decision.agent_id, "jarvis");
    assert_eq!(decision.text, "deploy to prod");
}

#[tokio::test]
async fn mention_is_case_insensitive_and_must_be_registered() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let router = router_with(&["jarvis"], vec![], Some("jarvis"), store);

    let decision = router
        .route(&InboundMessage::new("web", "u1", "@Jarvis status?"))
        .await
        .unwrap();
    assert_eq!(decision.agent_id, "jarvis");
    assert_eq!(decision.text, "status?");

    // Unregistered mention falls through; the @token stays in the text.
    let decision = router
        .route(&InboundMessage::new("web", "u1", "@ghost hello"))
        .await
        .unwrap();
    assert_eq!(decision.agent_id, "jarvis");
    assert_eq!(decision.text, "@ghost hello");
}

#[tokio::test]
async fn rules_match_in_declared_order() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let mut narrow = rule("slack", "scout");
    narrow.channel_user_id = Some("u-special".to_string());
    let router = router_with(
        &["scout", "work"],
        vec![narrow, rule("slack", "work")],
        None,
        store,
    );

    let decision = router
        .route(&InboundMessage::new("slack", "u-special", "hi"))
        .await
        .unwrap();
    assert_eq!(decision.agent_id, "scout");

    let decision = router
        .route(&InboundMessage::new("slack", "someone-else", "hi"))
        .await
        .unwrap();
    assert_eq!(decision.agent_id, "work");
}

#[tokio::test]
async fn rule_chat_id_must_match() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let mut group_rule = rule("telegram", "scout");
    group_rule.chat_id = Some("g-42".to_string());
    let router = router_with(&["scout"], vec![group_rule], Some("scout"), store);

    let in_group = InboundMessage::new("telegram", "u1", "hi").with_chat_id("g-42");
    assert_eq!(router.route(&in_group).await.unwrap().agent_id, "scout");

    let other_group = InboundMessage::new("telegram", "u1", "hi").with_chat_id("g-7");
    // Falls through the rule to the default.
    assert_eq!(router.route(&other_group).await.unwrap().agent_id, "scout");
}

#[tokio::test]
async fn user_mapping_applies_when_no_rule_matches() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    store
        .upsert_user(UserMapping {
            channel: "discord".to_string(),
            channel_user_id: "u9".to_string(),
            agent_id: "scout".to_string(),
            display_name: None,
        })
        .await
        .unwrap();
    let router = router_with(&["scout"], vec![], Some("fallback"), store);

    let decision = router
        .route(&InboundMessage::new("discord", "u9", "hello"))
        .await
        .unwrap();
    assert_eq!(decision.agent_id, "scout");
}

#[tokio::test]
async fn default_agent_is_the_last_resort() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let router = router_with(&[], vec![], Some("fallback"), store.clone());
    let decision = router
        .route(&InboundMessage::new("web", "anyone", "hi"))
        .await
        .unwrap();
    assert_eq!(decision.agent_id, "fallback");

    let bare = router_with(&[], vec![], None, store);
    assert!(bare
        .route(&InboundMessage::new("web", "anyone", "hi"))
        .await
        .is_err());
}

#[tokio::test]
async fn session_keys_separate_dms_from_groups() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let router = router_with(&[], vec![], Some("jarvis"), store);

    let dm = router
        .route(&InboundMessage::new("slack", "u1", "hi"))
        .await
        .unwrap();
    assert_eq!(dm.session_key, "slack:u1:jarvis");

    let group = router
        .route(&InboundMessage::new("slack", "u1", "hi").with_chat_id("C99"))
        .await
        .unwrap();
    assert_eq!(group.session_key, "slack:C99:jarvis");
    assert_ne!(dm.session_key, group.session_key);
}

#[tokio::test]
async fn agents_become_mentionable_at_runtime() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let router = router_with(&[], vec![], Some("fallback"), store);

    let msg = InboundMessage::new("web", "u1", "@newcomer hello");
    assert_eq!(router.route(&msg).await.unwrap().agent_id, "fallback");

    router.add_agent("newcomer");
    let decision = router.route(&msg).await.unwrap();
    assert_eq!(decision.agent_id, "newcomer");
    assert_eq!(decision.text, "hello");

    router.remove_agent("newcomer");
    assert_eq!(router.route(&msg).await.unwrap().agent_id, "fallback");
}
