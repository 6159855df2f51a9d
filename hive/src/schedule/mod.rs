//! Scheduling: recurring cron jobs, per-agent heartbeats, and the one-shot
//! deferred task queue.
//!
//! All timers are tokio tasks hanging off a cancellation token; they hold
//! no locks and dispatch through the session manager's ordinary send path,
//! so a tick on a busy conversation queues behind the in-flight send.

mod cron_jobs;
mod heartbeat;
mod maintenance;
mod queue;

pub use cron_jobs::CronScheduler;
pub use heartbeat::{
    compose_heartbeat_prompt, is_within_active_hours, parse_interval, HeartbeatScheduler,
    HEARTBEAT_OK,
};
pub use maintenance::MemoryMaintenance;
pub use queue::TaskQueue;

use crate::session::SessionError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("cron expression: {0}")]
    BadExpression(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Session(#[from] SessionError),
}
