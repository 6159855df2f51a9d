//! Orchestrator store: sessions, user mappings, cron jobs, task queue.

use hive::fsutil::now_ms;
use hive::store::{
    CronJob, QueuedTask, SessionRow, SessionStatus, Store, StoreError, TaskStatus, UserMapping,
};

fn session(conversation_id: &str, agent: &str) -> SessionRow {
    let now = now_ms();
    SessionRow {
        conversation_id: conversation_id.to_string(),
        agent_id: agent.to_string(),
        channel: "web".to_string(),
        status: SessionStatus::Active,
        turn_count: 0,
        created_at_ms: now,
        last_active_at_ms: now,
    }
}

#[tokio::test]
async fn sessions_upsert_get_touch() {
    let store = Store::open_in_memory().unwrap();
    store.upsert_session(session("c1", "jarvis")).await.unwrap();

    let row = store.get_session("c1").await.unwrap().unwrap();
    assert_eq!(row.agent_id, "jarvis");
    assert_eq!(row.turn_count, 0);

    store
        .touch_session("c1", SessionStatus::Idle, 2)
        .await
        .unwrap();
    let row = store.get_session("c1").await.unwrap().unwrap();
    assert_eq!(row.status, SessionStatus::Idle);
    assert_eq!(row.turn_count, 2);

    assert!(matches!(
        store.touch_session("ghost", SessionStatus::Active, 1).await,
        Err(StoreError::NotFound(_))
    ));
    assert_eq!(store.list_sessions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn user_mapping_upserts() {
    let store = Store::open_in_memory().unwrap();
    let mapping = UserMapping {
        channel: "telegram".to_string(),
        channel_user_id: "42".to_string(),
        agent_id: "scout".to_string(),
        display_name: Some("Sam".to_string()),
    };
    store.upsert_user(mapping.clone()).await.unwrap();
    assert_eq!(
        store.user_agent("telegram", "42").await.unwrap().as_deref(),
        Some("scout")
    );

    // Same key, new agent: replaced, not duplicated.
    store
        .upsert_user(UserMapping {
            agent_id: "jarvis".to_string(),
            ..mapping
        })
        .await
        .unwrap();
    assert_eq!(
        store.user_agent("telegram", "42").await.unwrap().as_deref(),
        Some("jarvis")
    );
    assert_eq!(store.user_agent("telegram", "43").await.unwrap(), None);
}

#[tokio::test]
async fn cron_names_are_globally_unique() {
    let store = Store::open_in_memory().unwrap();
    store
        .add_cron_job(CronJob::new("daily-report", "0 0 9 * * * *", "jarvis", "report"))
        .await
        .unwrap();

    let duplicate = store
        .add_cron_job(CronJob::new("daily-report", "0 0 10 * * * *", "scout", "other"))
        .await;
    assert!(matches!(duplicate, Err(StoreError::Conflict(_))));
}

#[tokio::test]
async fn cron_crud_and_last_run() {
    let store = Store::open_in_memory().unwrap();
    let mut job = CronJob::new("standup", "0 0 9 * * Mon *", "jarvis", "post standup");
    job.deliver_to = Some("slack:#standup".to_string());
    store.add_cron_job(job).await.unwrap();

    let loaded = store.get_cron_job_by_name("standup").await.unwrap().unwrap();
    assert_eq!(loaded.deliver_to.as_deref(), Some("slack:#standup"));
    assert!(loaded.enabled);
    assert_eq!(loaded.last_run_at_ms, None);

    store.update_cron_last_run("standup").await.unwrap();
    let loaded = store.get_cron_job_by_name("standup").await.unwrap().unwrap();
    assert!(loaded.last_run_at_ms.is_some());

    store.set_cron_enabled("standup", false).await.unwrap();
    assert!(store.list_cron_jobs(true).await.unwrap().is_empty());
    assert_eq!(store.list_cron_jobs(false).await.unwrap().len(), 1);

    store.remove_cron_job("standup").await.unwrap();
    assert!(store.get_cron_job_by_name("standup").await.unwrap().is_none());
    assert!(matches!(
        store.remove_cron_job("standup").await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn tasks_become_due_and_transition() {
    let store = Store::open_in_memory().unwrap();
    let now = now_ms();
    let due = QueuedTask::new("jarvis", "do it", now - 1000);
    let future = QueuedTask::new("jarvis", "later", now + 60_000);
    store.enqueue_task(due.clone()).await.unwrap();
    store.enqueue_task(future).await.unwrap();

    let ready = store.due_tasks(now, 10).await.unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].id, due.id);

    store
        .transition_task(&due.id, TaskStatus::Running, None, None)
        .await
        .unwrap();
    // Running tasks are no longer due.
    assert!(store.due_tasks(now, 10).await.unwrap().is_empty());

    store
        .transition_task(&due.id, TaskStatus::Completed, Some("done".into()), None)
        .await
        .unwrap();
    let finished = store.get_task(&due.id).await.unwrap().unwrap();
    assert_eq!(finished.status, TaskStatus::Completed);
    assert_eq!(finished.result.as_deref(), Some("done"));
    assert!(finished.completed_at_ms.is_some());
}

#[tokio::test]
async fn long_overdue_tasks_expire() {
    let store = Store::open_in_memory().unwrap();
    let now = now_ms();
    let stale = QueuedTask::new("jarvis", "stale", now - 2 * 60 * 60 * 1000);
    let fresh = QueuedTask::new("jarvis", "fresh", now - 1000);
    store.enqueue_task(stale.clone()).await.unwrap();
    store.enqueue_task(fresh.clone()).await.unwrap();

    let expired = store
        .expire_overdue_tasks(now, 60 * 60 * 1000)
        .await
        .unwrap();
    assert_eq!(expired, 1);
    assert_eq!(
        store.get_task(&stale.id).await.unwrap().unwrap().status,
        TaskStatus::Expired
    );
    assert_eq!(
        store.get_task(&fresh.id).await.unwrap().unwrap().status,
        TaskStatus::Pending
    );
}

#[tokio::test]
async fn cancelled_tasks_stay_cancelled() {
    let store = Store::open_in_memory().unwrap();
    let task = QueuedTask::new("jarvis", "never mind", now_ms() - 1);
    store.enqueue_task(task.clone()).await.unwrap();
    store
        .transition_task(&task.id, TaskStatus::Cancelled, None, None)
        .await
        .unwrap();
    assert!(store.due_tasks(now_ms(), 10).await.unwrap().is_empty());
}
