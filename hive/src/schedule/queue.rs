//! One-shot deferred prompts, polled by `execute_at`.
//!
//! Pending tasks become running when dispatched, then completed or failed;
//! the user can cancel a pending task, and tasks long overdue at poll time
//! are expired instead of run.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::ScheduleError;
use crate::fsutil::now_ms;
use crate::session::{SendOptions, SessionManager};
use crate::store::{QueuedTask, Store, TaskStatus};

/// How often the queue looks for due tasks.
const POLL_INTERVAL: Duration = Duration::from_secs(15);
/// A pending task this far past due is expired, not run.
const EXPIRY: Duration = Duration::from_secs(60 * 60);
/// Max tasks dispatched per poll.
const BATCH: usize = 16;

pub struct TaskQueue {
    store: Arc<Store>,
    sessions: Arc<SessionManager>,
    cancel: CancellationToken,
}

impl TaskQueue {
    pub fn new(
        store: Arc<Store>,
        sessions: Arc<SessionManager>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            sessions,
            cancel,
        })
    }

    /// Enqueues a task for later execution.
    pub async fn enqueue(&self, task: QueuedTask) -> Result<(), ScheduleError> {
        self.store.enqueue_task(task).await?;
        Ok(())
    }

    /// Cancels a pending task.
    pub async fn cancel_task(&self, id: &str) -> Result<(), ScheduleError> {
        self.store
            .transition_task(id, TaskStatus::Cancelled, None, None)
            .await?;
        Ok(())
    }

    /// Starts the poll loop; returns immediately.
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let token = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(POLL_INTERVAL) => {
                        this.poll_once().await;
                    }
                }
            }
        });
    }

    /// One poll pass: expire the long-overdue, then dispatch what is due.
    pub async fn poll_once(&self) {
        let now = now_ms();
        match self
            .store
            .expire_overdue_tasks(now, EXPIRY.as_millis() as i64)
            .await
        {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "expired overdue tasks"),
            Err(e) => tracing::error!(error = %e, "task expiry failed"),
        }

        let due = match self.store.due_tasks(now, BATCH).await {
            Ok(due) => due,
            Err(e) => {
                tracing::error!(error = %e, "task poll failed");
                return;
            }
        };
        for task in due {
            self.run_task(task).await;
        }
    }

    async fn run_task(&self, task: QueuedTask) {
        if let Err(e) = self
            .store
            .transition_task(&task.id, TaskStatus::Running, None, None)
            .await
        {
            tracing::error!(task = %task.id, error = %e, "task start transition failed");
            return;
        }

        let conversation_id = task
            .conversation_id
            .clone()
            .unwrap_or_else(|| format!("task:{}", task.id));
        let outcome = self
            .sessions
            .send_message(
                &task.agent_id,
                &task.prompt,
                SendOptions {
                    conversation_id: Some(conversation_id),
                    ..Default::default()
                },
            )
            .await;

        let transition = match outcome {
            Ok(outcome) => {
                self.store
                    .transition_task(&task.id, TaskStatus::Completed, Some(outcome.text), None)
                    .await
            }
            Err(e) => {
                self.store
                    .transition_task(&task.id, TaskStatus::Failed, None, Some(e.to_string()))
                    .await
            }
        };
        if let Err(e) = transition {
            tracing::error!(task = %task.id, error = %e, "task completion transition failed");
        }
    }
}
