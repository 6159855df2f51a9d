//! Row types for the orchestrator store.

use serde::{Deserialize, Serialize};

/// One conversation bound to an agent and an external LLM session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRow {
    pub conversation_id: String,
    pub agent_id: String,
    pub channel: String,
    pub status: SessionStatus,
    pub turn_count: i64,
    pub created_at_ms: i64,
    pub last_active_at_ms: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Idle,
    Terminated,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Idle => "idle",
            SessionStatus::Terminated => "terminated",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "idle" => SessionStatus::Idle,
            "terminated" => SessionStatus::Terminated,
            _ => SessionStatus::Active,
        }
    }
}

/// `(channel, channel_user_id) → agent` mapping, consulted by the router
/// when no routing rule matches.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserMapping {
    pub channel: String,
    pub channel_user_id: String,
    pub agent_id: String,
    pub display_name: Option<String>,
}

/// A recurring scheduled prompt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CronJob {
    pub id: String,
    /// Globally unique.
    pub name: String,
    /// Cron expression, e.g. `0 0 9 * * Mon-Fri *`.
    pub expression: String,
    pub agent_id: String,
    pub prompt: String,
    /// Optional delivery target as `"channel:target"`.
    pub deliver_to: Option<String>,
    pub enabled: bool,
    pub last_run_at_ms: Option<i64>,
}

impl CronJob {
    pub fn new(
        name: impl Into<String>,
        expression: impl Into<String>,
        agent_id: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            expression: expression.into(),
            agent_id: agent_id.into(),
            prompt: prompt.into(),
            deliver_to: None,
            enabled: true,
            last_run_at_ms: None,
        }
    }
}

/// A one-shot deferred prompt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueuedTask {
    pub id: String,
    pub agent_id: String,
    pub conversation_id: Option<String>,
    pub prompt: String,
    pub description: String,
    pub execute_at_ms: i64,
    pub status: TaskStatus,
    pub retry_count: i64,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at_ms: i64,
    pub completed_at_ms: Option<i64>,
}

impl QueuedTask {
    pub fn new(
        agent_id: impl Into<String>,
        prompt: impl Into<String>,
        execute_at_ms: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            conversation_id: None,
            prompt: prompt.into(),
            description: String::new(),
            execute_at_ms,
            status: TaskStatus::Pending,
            retry_count: 0,
            result: None,
            error: None,
            created_at_ms: crate::fsutil::now_ms(),
            completed_at_ms: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => TaskStatus::Running,
            "completed" => TaskStatus::Completed,
            "failed" => TaskStatus::Failed,
            "cancelled" => TaskStatus::Cancelled,
            "expired" => TaskStatus::Expired,
            _ => TaskStatus::Pending,
        }
    }
}

pub(super) fn session_from_row(row: &rusqlite::Row<'_>) -> Result<SessionRow, super::StoreError> {
    let status: String = row.get(3)?;
    Ok(SessionRow {
        conversation_id: row.get(0)?,
        agent_id: row.get(1)?,
        channel: row.get(2)?,
        status: SessionStatus::parse(&status),
        turn_count: row.get(4)?,
        created_at_ms: row.get(5)?,
        last_active_at_ms: row.get(6)?,
    })
}

pub(super) fn cron_from_row(row: &rusqlite::Row<'_>) -> Result<CronJob, super::StoreError> {
    let enabled: i64 = row.get(6)?;
    Ok(CronJob {
        id: row.get(0)?,
        name: row.get(1)?,
        expression: row.get(2)?,
        agent_id: row.get(3)?,
        prompt: row.get(4)?,
        deliver_to: row.get(5)?,
        enabled: enabled != 0,
        last_run_at_ms: row.get(7)?,
    })
}

pub(super) fn task_from_row(row: &rusqlite::Row<'_>) -> Result<QueuedTask, super::StoreError> {
    let status: String = row.get(6)?;
    Ok(QueuedTask {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        conversation_id: row.get(2)?,
        prompt: row.get(3)?,
        description: row.get(4)?,
        execute_at_ms: row.get(5)?,
        status: TaskStatus::parse(&status),
        retry_count: row.get(7)?,
        result: row.get(8)?,
        error: row.get(9)?,
        created_at_ms: row.get(10)?,
        completed_at_ms: row.get(11)?,
    })
}
