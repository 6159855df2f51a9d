//! Heartbeat and cron behavior against the mock runner and adapter.

mod common;

use std::sync::Arc;

use config::{HeartbeatConfig, HeartbeatMode};
use hive::channel::{ChannelAdapter, MockAdapter};
use hive::schedule::{CronScheduler, HeartbeatScheduler, TaskQueue, HEARTBEAT_OK};
use hive::store::{CronJob, QueuedTask, TaskStatus};
use tokio_util::sync::CancellationToken;

fn heartbeat_cfg() -> HeartbeatConfig {
    HeartbeatConfig {
        enabled: true,
        interval: "5m".to_string(),
        mode: HeartbeatMode::Check,
        active_hours: None,
        suppress_ok: true,
        deliver_to: Some("slack:#alerts".to_string()),
    }
}

async fn slack(h: &common::Harness) -> Arc<MockAdapter> {
    let adapter = Arc::new(MockAdapter::new("slack"));
    adapter.connect().await.unwrap();
    h.channels.register(adapter.clone());
    adapter
}

#[tokio::test]
async fn heartbeat_ok_is_suppressed_but_logged() {
    let h = common::harness(&["jarvis"]);
    let adapter = slack(&h).await;
    h.runner.push_text(HEARTBEAT_OK);

    let scheduler = HeartbeatScheduler::new(
        Arc::clone(&h.registry),
        Arc::clone(&h.sessions),
        Arc::clone(&h.channels),
        Arc::clone(&h.activity),
        CancellationToken::new(),
    );
    scheduler.tick("jarvis", &heartbeat_cfg()).await;

    // Suppressed: nothing went out on the channel.
    assert!(adapter.sent().is_empty());
    // The activity entry is still written.
    let entries = h.activity.entries();
    assert!(entries
        .iter()
        .any(|e| e.agent_id == "jarvis" && e.kind == "heartbeat.tick"));
}

#[tokio::test]
async fn heartbeat_attention_is_delivered() {
    let h = common::harness(&["jarvis"]);
    let adapter = slack(&h).await;
    h.runner.push_text("The queue is backed up.");

    let scheduler = HeartbeatScheduler::new(
        Arc::clone(&h.registry),
        Arc::clone(&h.sessions),
        Arc::clone(&h.channels),
        Arc::clone(&h.activity),
        CancellationToken::new(),
    );
    scheduler.tick("jarvis", &heartbeat_cfg()).await;

    let sent = adapter.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "#alerts");
    assert!(sent[0].1.contains("queue is backed up"));
}

#[tokio::test]
async fn heartbeat_prompt_reads_the_checklist() {
    let h = common::harness(&["jarvis"]);
    slack(&h).await;
    std::fs::write(
        h.registry.heartbeat_path("jarvis"),
        "# Heartbeat\n- [ ] rotate the API key\n",
    )
    .unwrap();

    let scheduler = HeartbeatScheduler::new(
        Arc::clone(&h.registry),
        Arc::clone(&h.sessions),
        Arc::clone(&h.channels),
        Arc::clone(&h.activity),
        CancellationToken::new(),
    );
    scheduler.tick("jarvis", &heartbeat_cfg()).await;

    let request = &h.runner.requests()[0];
    assert!(request.prompt.contains("rotate the API key"));
    assert!(request
        .prompt
        .contains("respond with exactly: HEARTBEAT_OK"));
}

#[tokio::test]
async fn heartbeat_falls_back_to_the_agent_notify_target() {
    let h = common::harness(&[]);
    let mut agent = config::AgentConfig::default();
    agent.notify = Some("slack:#jarvis-feed".to_string());
    h.registry.register("jarvis", agent).unwrap();
    let adapter = slack(&h).await;
    h.runner.push_text("something came up");

    let mut cfg = heartbeat_cfg();
    cfg.deliver_to = None;
    let scheduler = HeartbeatScheduler::new(
        Arc::clone(&h.registry),
        Arc::clone(&h.sessions),
        Arc::clone(&h.channels),
        Arc::clone(&h.activity),
        CancellationToken::new(),
    );
    scheduler.tick("jarvis", &cfg).await;

    let sent = adapter.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "#jarvis-feed");
}

#[tokio::test]
async fn maintenance_pass_consolidates_and_reindexes() {
    let h = common::harness(&["jarvis"]);
    let agent_root = h.registry.agent_dir("jarvis");
    let today = chrono::Utc::now().date_naive().format("%Y-%m-%d");
    std::fs::write(
        agent_root.join("memory").join(format!("{}.md", today)),
        "- **Fresh maintenance fact**\n",
    )
    .unwrap();

    let maintenance = hive::schedule::MemoryMaintenance::new(
        Arc::clone(&h.registry),
        Arc::clone(&h.activity),
        None,
        CancellationToken::new(),
    );
    maintenance.run_once("jarvis").await;

    let memory = std::fs::read_to_string(h.registry.memory_path("jarvis")).unwrap();
    assert!(memory.contains("Fresh maintenance fact"));
    assert!(h.registry.memory_db_path("jarvis").exists());
    assert!(h
        .activity
        .entries()
        .iter()
        .any(|e| e.kind == "memory.consolidate"));
}

#[tokio::test]
async fn cron_execute_updates_last_run_even_when_delivery_fails() {
    let h = common::harness(&["jarvis"]);
    // No channel registered: delivery must fail, last_run_at must advance.
    let mut job = CronJob::new("report", "0 0 9 * * * *", "jarvis", "write the report");
    job.deliver_to = Some("slack:#reports".to_string());
    h.store.add_cron_job(job.clone()).await.unwrap();

    let scheduler = CronScheduler::new(
        Arc::clone(&h.store),
        Arc::clone(&h.sessions),
        Arc::clone(&h.channels),
        CancellationToken::new(),
    );
    scheduler.execute_job(&job).await;

    let loaded = h.store.get_cron_job_by_name("report").await.unwrap().unwrap();
    assert!(loaded.last_run_at_ms.is_some());
    // The prompt itself was dispatched.
    assert_eq!(h.runner.requests()[0].prompt, "write the report");
}

#[tokio::test]
async fn cron_result_is_delivered_to_the_target() {
    let h = common::harness(&["jarvis"]);
    let adapter = slack(&h).await;
    h.runner.push_text("report ready");

    let mut job = CronJob::new("report", "0 0 9 * * * *", "jarvis", "write the report");
    job.deliver_to = Some("slack:#reports".to_string());
    h.store.add_cron_job(job.clone()).await.unwrap();

    let scheduler = CronScheduler::new(
        Arc::clone(&h.store),
        Arc::clone(&h.sessions),
        Arc::clone(&h.channels),
        CancellationToken::new(),
    );
    scheduler.execute_job(&job).await;

    let sent = adapter.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "#reports");
    assert_eq!(sent[0].1, "report ready");
}

#[tokio::test]
async fn bad_cron_expression_is_rejected_before_storage() {
    let h = common::harness(&["jarvis"]);
    let scheduler = CronScheduler::new(
        Arc::clone(&h.store),
        Arc::clone(&h.sessions),
        Arc::clone(&h.channels),
        CancellationToken::new(),
    );
    let job = CronJob::new("broken", "not a cron line", "jarvis", "p");
    assert!(scheduler.add_job(job).await.is_err());
    assert!(h.store.get_cron_job_by_name("broken").await.unwrap().is_none());
}

#[tokio::test]
async fn queue_poll_runs_due_tasks() {
    let h = common::harness(&["jarvis"]);
    h.runner.push_text("deferred done");
    let task = QueuedTask::new("jarvis", "do the deferred thing", hive::fsutil::now_ms() - 10);
    h.store.enqueue_task(task.clone()).await.unwrap();

    let queue = TaskQueue::new(
        Arc::clone(&h.store),
        Arc::clone(&h.sessions),
        CancellationToken::new(),
    );
    queue.poll_once().await;

    let finished = h.store.get_task(&task.id).await.unwrap().unwrap();
    assert_eq!(finished.status, TaskStatus::Completed);
    assert_eq!(finished.result.as_deref(), Some("deferred done"));
}

#[tokio::test]
async fn queue_marks_failures() {
    let h = common::harness(&["jarvis"]);
    h.runner.push_failure("no model");
    let task = QueuedTask::new("jarvis", "doomed", hive::fsutil::now_ms() - 10);
    h.store.enqueue_task(task.clone()).await.unwrap();

    let queue = TaskQueue::new(
        Arc::clone(&h.store),
        Arc::clone(&h.sessions),
        CancellationToken::new(),
    );
    queue.poll_once().await;

    let finished = h.store.get_task(&task.id).await.unwrap().unwrap();
    assert_eq!(finished.status, TaskStatus::Failed);
    assert!(finished.error.as_deref().unwrap().contains("no model"));
}
