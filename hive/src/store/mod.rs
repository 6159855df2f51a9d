//! Embedded SQL store at `<root>/orchestrator.db`: sessions, user mappings,
//! cron jobs, and the one-shot task queue.
//!
//! One connection, write-ahead logging on file-backed databases, every
//! multi-statement change inside a transaction. Callers go through
//! `spawn_blocking`; tests use the in-memory variant.

mod rows;

use std::path::Path;
use std::sync::{Arc, Mutex};

pub use rows::{CronJob, QueuedTask, SessionRow, SessionStatus, TaskStatus, UserMapping};

use crate::fsutil::now_ms;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Storage(e.to_string())
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    conversation_id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    channel TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'active',
    turn_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    last_active_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS users (
    channel TEXT NOT NULL,
    channel_user_id TEXT NOT NULL,
    agent_id TEXT NOT NULL,
    display_name TEXT,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (channel, channel_user_id)
);
CREATE TABLE IF NOT EXISTS cron_jobs (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    expression TEXT NOT NULL,
    agent_id TEXT NOT NULL,
    prompt TEXT NOT NULL,
    deliver_to TEXT,
    enabled INTEGER NOT NULL DEFAULT 1,
    last_run_at INTEGER
);
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    conversation_id TEXT,
    prompt TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    execute_at INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    retry_count INTEGER NOT NULL DEFAULT 0,
    result TEXT,
    error TEXT,
    created_at INTEGER NOT NULL,
    completed_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks(status, execute_at);
"#;

/// The orchestrator-level store. Cheap to clone via `Arc`.
pub struct Store {
    db: Arc<Mutex<rusqlite::Connection>>,
}

impl Store {
    /// Opens or creates the database file with WAL enabled.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = rusqlite::Connection::open(path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// In-memory variant for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(rusqlite::Connection::open_in_memory()?)
    }

    fn init(conn: rusqlite::Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = db.lock().map_err(|_| StoreError::Storage("lock".into()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    // --- sessions ---

    /// Inserts or refreshes a session row.
    pub async fn upsert_session(&self, row: SessionRow) -> Result<(), StoreError> {
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO sessions (conversation_id, agent_id, channel, status, turn_count, created_at, last_active_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(conversation_id) DO UPDATE SET
                    agent_id = excluded.agent_id,
                    channel = excluded.channel,
                    status = excluded.status,
                    turn_count = excluded.turn_count,
                    last_active_at = excluded.last_active_at",
                rusqlite::params![
                    row.conversation_id,
                    row.agent_id,
                    row.channel,
                    row.status.as_str(),
                    row.turn_count,
                    row.created_at_ms,
                    row.last_active_at_ms,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_session(
        &self,
        conversation_id: &str,
    ) -> Result<Option<SessionRow>, StoreError> {
        let conversation_id = conversation_id.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT conversation_id, agent_id, channel, status, turn_count, created_at, last_active_at
                 FROM sessions WHERE conversation_id = ?1",
            )?;
            let mut rows = stmt.query(rusqlite::params![conversation_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(rows::session_from_row(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionRow>, StoreError> {
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT conversation_id, agent_id, channel, status, turn_count, created_at, last_active_at
                 FROM sessions ORDER BY last_active_at DESC",
            )?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(rows::session_from_row(row)?);
            }
            Ok(out)
        })
        .await
    }

    /// Bumps `last_active_at`, status, and the turn counter after a send.
    pub async fn touch_session(
        &self,
        conversation_id: &str,
        status: SessionStatus,
        turns_added: i64,
    ) -> Result<(), StoreError> {
        let conversation_id = conversation_id.to_string();
        self.blocking(move |conn| {
            let updated = conn.execute(
                "UPDATE sessions SET status = ?2, turn_count = turn_count + ?3, last_active_at = ?4
                 WHERE conversation_id = ?1",
                rusqlite::params![conversation_id, status.as_str(), turns_added, now_ms()],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!(
                    "session: {}",
                    conversation_id
                )));
            }
            Ok(())
        })
        .await
    }

    // --- users ---

    pub async fn upsert_user(&self, mapping: UserMapping) -> Result<(), StoreError> {
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO users (channel, channel_user_id, agent_id, display_name, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(channel, channel_user_id) DO UPDATE SET
                    agent_id = excluded.agent_id,
                    display_name = excluded.display_name,
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    mapping.channel,
                    mapping.channel_user_id,
                    mapping.agent_id,
                    mapping.display_name,
                    now_ms(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// The agent mapped to `(channel, channel_user_id)`, if any.
    pub async fn user_agent(
        &self,
        channel: &str,
        channel_user_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let channel = channel.to_string();
        let channel_user_id = channel_user_id.to_string();
        self.blocking(move |conn| {
            let agent: Option<String> = conn
                .query_row(
                    "SELECT agent_id FROM users WHERE channel = ?1 AND channel_user_id = ?2",
                    rusqlite::params![channel, channel_user_id],
                    |row| row.get(0),
                )
                .ok();
            Ok(agent)
        })
        .await
    }

    // --- cron jobs ---

    /// Adds a job. Names are globally unique; a duplicate is a conflict.
    pub async fn add_cron_job(&self, job: CronJob) -> Result<(), StoreError> {
        self.blocking(move |conn| {
            let result = conn.execute(
                "INSERT INTO cron_jobs (id, name, expression, agent_id, prompt, deliver_to, enabled, last_run_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    job.id,
                    job.name,
                    job.expression,
                    job.agent_id,
                    job.prompt,
                    job.deliver_to,
                    job.enabled as i64,
                    job.last_run_at_ms,
                ],
            );
            match result {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::Conflict(format!("cron job name: {}", job.name)))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    pub async fn remove_cron_job(&self, name: &str) -> Result<(), StoreError> {
        let name = name.to_string();
        self.blocking(move |conn| {
            let removed = conn.execute(
                "DELETE FROM cron_jobs WHERE name = ?1",
                rusqlite::params![name],
            )?;
            if removed == 0 {
                return Err(StoreError::NotFound(format!("cron job: {}", name)));
            }
            Ok(())
        })
        .await
    }

    pub async fn set_cron_enabled(&self, name: &str, enabled: bool) -> Result<(), StoreError> {
        let name = name.to_string();
        self.blocking(move |conn| {
            let updated = conn.execute(
                "UPDATE cron_jobs SET enabled = ?2 WHERE name = ?1",
                rusqlite::params![name, enabled as i64],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("cron job: {}", name)));
            }
            Ok(())
        })
        .await
    }

    pub async fn get_cron_job_by_name(&self, name: &str) -> Result<Option<CronJob>, StoreError> {
        let name = name.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, expression, agent_id, prompt, deliver_to, enabled, last_run_at
                 FROM cron_jobs WHERE name = ?1",
            )?;
            let mut rows = stmt.query(rusqlite::params![name])?;
            match rows.next()? {
                Some(row) => Ok(Some(rows::cron_from_row(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn list_cron_jobs(&self, enabled_only: bool) -> Result<Vec<CronJob>, StoreError> {
        self.blocking(move |conn| {
            let sql = if enabled_only {
                "SELECT id, name, expression, agent_id, prompt, deliver_to, enabled, last_run_at
                 FROM cron_jobs WHERE enabled = 1 ORDER BY name"
            } else {
                "SELECT id, name, expression, agent_id, prompt, deliver_to, enabled, last_run_at
                 FROM cron_jobs ORDER BY name"
            };
            let mut stmt = conn.prepare(sql)?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(rows::cron_from_row(row)?);
            }
            Ok(out)
        })
        .await
    }

    /// Stamps `last_run_at`. Called after every execution attempt,
    /// regardless of delivery success.
    pub async fn update_cron_last_run(&self, name: &str) -> Result<(), StoreError> {
        let name = name.to_string();
        self.blocking(move |conn| {
            conn.execute(
                "UPDATE cron_jobs SET last_run_at = ?2 WHERE name = ?1",
                rusqlite::params![name, now_ms()],
            )?;
            Ok(())
        })
        .await
    }

    // --- task queue ---

    pub async fn enqueue_task(&self, task: QueuedTask) -> Result<(), StoreError> {
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO tasks (id, agent_id, conversation_id, prompt, description, execute_at, status, retry_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    task.id,
                    task.agent_id,
                    task.conversation_id,
                    task.prompt,
                    task.description,
                    task.execute_at_ms,
                    task.status.as_str(),
                    task.retry_count,
                    task.created_at_ms,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Pending tasks whose `execute_at` is due at `now`.
    pub async fn due_tasks(&self, now_ms: i64, limit: usize) -> Result<Vec<QueuedTask>, StoreError> {
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, agent_id, conversation_id, prompt, description, execute_at, status, retry_count, result, error, created_at, completed_at
                 FROM tasks WHERE status = 'pending' AND execute_at <= ?1
                 ORDER BY execute_at ASC LIMIT ?2",
            )?;
            let mut rows = stmt.query(rusqlite::params![now_ms, limit as i64])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(rows::task_from_row(row)?);
            }
            Ok(out)
        })
        .await
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<QueuedTask>, StoreError> {
        let id = id.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, agent_id, conversation_id, prompt, description, execute_at, status, retry_count, result, error, created_at, completed_at
                 FROM tasks WHERE id = ?1",
            )?;
            let mut rows = stmt.query(rusqlite::params![id])?;
            match rows.next()? {
                Some(row) => Ok(Some(rows::task_from_row(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// Transitions a task's status. `completed`/`failed` also record the
    /// result or error and the completion time.
    pub async fn transition_task(
        &self,
        id: &str,
        status: TaskStatus,
        result: Option<String>,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let id = id.to_string();
        self.blocking(move |conn| {
            let completed = matches!(
                status,
                TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Expired
            );
            let completed_at = completed.then(now_ms);
            let updated = conn.execute(
                "UPDATE tasks SET status = ?2, result = COALESCE(?3, result),
                        error = COALESCE(?4, error), completed_at = COALESCE(?5, completed_at)
                 WHERE id = ?1",
                rusqlite::params![id, status.as_str(), result, error, completed_at],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("task: {}", id)));
            }
            Ok(())
        })
        .await
    }

    /// Marks pending tasks older than `cutoff_ms` past due as expired.
    /// Returns how many were expired.
    pub async fn expire_overdue_tasks(
        &self,
        now_ms: i64,
        cutoff_ms: i64,
    ) -> Result<usize, StoreError> {
        self.blocking(move |conn| {
            let expired = conn.execute(
                "UPDATE tasks SET status = 'expired', completed_at = ?1
                 WHERE status = 'pending' AND execute_at < ?1 - ?2",
                rusqlite::params![now_ms, cutoff_ms],
            )?;
            Ok(expired)
        })
        .await
    }
}
