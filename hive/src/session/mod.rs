//! Session manager: subprocess lifecycle, conversation multiplexing, and
//! resume-by-id across restarts.
//!
//! Each conversation serializes its sends through a per-conversation
//! mutex; different conversations run in parallel. The conversation →
//! external-session-id mapping is persisted to `session-map.json` before a
//! send returns, so a crash-restarted orchestrator can resume where it
//! left off.

mod runner;
mod session_map;
mod transcript;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

pub use runner::{AgentRunner, CliRunner, MockRunner, RunOutcome, RunRequest, DEFAULT_RUN_TIMEOUT};
pub use session_map::SessionMap;
pub use transcript::{ToolStep, Transcript};

use crate::activity::ActivityLog;
use crate::fsutil::now_ms;
use crate::registry::{AgentRegistry, RegistryError};
use crate::store::{SessionRow, SessionStatus, Store, StoreError};
use crate::toolserver::ToolServerSupervisor;

/// Bytes of `MEMORY.md` injected into the system prompt.
const MEMORY_EXCERPT_BYTES: usize = 4000;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Agent(#[from] RegistryError),
    #[error("session spawn: {message}")]
    Spawn { message: String, stderr: String },
    #[error("session not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("session io: {0}")]
    Io(#[from] std::io::Error),
}

/// Options for one send.
#[derive(Clone, Debug, Default)]
pub struct SendOptions {
    /// Conversation to send into; a fresh one is minted when absent.
    pub conversation_id: Option<String>,
    /// Originating channel, recorded on the session row.
    pub channel: Option<String>,
    /// Extra channel/user context appended to the system prompt.
    pub user_context: Option<String>,
}

/// What a completed send returns.
#[derive(Clone, Debug)]
pub struct SendOutcome {
    pub conversation_id: String,
    pub session_id: Option<String>,
    pub text: String,
    pub steps: Vec<ToolStep>,
}

pub struct SessionManager {
    registry: Arc<AgentRegistry>,
    store: Arc<Store>,
    runner: Arc<dyn AgentRunner>,
    supervisor: Arc<ToolServerSupervisor>,
    activity: Arc<ActivityLog>,
    session_map: SessionMap,
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    timeout: Duration,
}

impl SessionManager {
    pub fn new(
        root: impl Into<PathBuf>,
        registry: Arc<AgentRegistry>,
        store: Arc<Store>,
        runner: Arc<dyn AgentRunner>,
        supervisor: Arc<ToolServerSupervisor>,
        activity: Arc<ActivityLog>,
    ) -> Self {
        let root = root.into();
        Self {
            registry,
            store,
            runner,
            supervisor,
            activity,
            session_map: SessionMap::load(root.join("session-map.json")),
            locks: DashMap::new(),
            timeout: DEFAULT_RUN_TIMEOUT,
        }
    }

    /// Overrides the per-invocation subprocess timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn conversation_lock(&self, conversation_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Composes the effective system prompt: `SOUL.md`, a `MEMORY.md`
    /// excerpt read at invocation time, and any channel/user context.
    fn compose_system_prompt(&self, agent_id: &str, user_context: Option<&str>) -> String {
        let mut prompt = std::fs::read_to_string(self.registry.soul_path(agent_id))
            .unwrap_or_default()
            .trim_end()
            .to_string();

        if let Ok(memory) = std::fs::read_to_string(self.registry.memory_path(agent_id)) {
            let trimmed = memory.trim();
            if !trimmed.is_empty() {
                let mut end = trimmed.len().min(MEMORY_EXCERPT_BYTES);
                while end < trimmed.len() && !trimmed.is_char_boundary(end) {
                    end += 1;
                }
                prompt.push_str("\n\n# Long-term memory\n\n");
                prompt.push_str(&trimmed[..end]);
            }
        }
        if let Some(context) = user_context {
            prompt.push_str("\n\n# Context\n\n");
            prompt.push_str(context);
        }
        prompt
    }

    /// Sends one message into a conversation, spawning or resuming the LLM
    /// subprocess. Sends to the same conversation are serialized; a second
    /// send queues behind the running one.
    pub async fn send_message(
        &self,
        agent_id: &str,
        prompt: &str,
        opts: SendOptions,
    ) -> Result<SendOutcome, SessionError> {
        let agent = self.registry.get(agent_id)?;
        let conversation_id = opts
            .conversation_id
            .clone()
            .unwrap_or_else(|| format!("direct:{}:{}", agent_id, uuid::Uuid::new_v4()));

        let lock = self.conversation_lock(&conversation_id);
        let _guard = lock.lock().await;

        let manifest = self
            .supervisor
            .compose_manifest(agent_id, &agent.tool_servers)?;

        let allowed_tools = config::resolve_allowed_tools(
            agent.tool_preset,
            &agent.custom_tools,
            &agent.tool_servers,
        );

        let mut request = RunRequest {
            agent_id: agent_id.to_string(),
            prompt: prompt.to_string(),
            system_prompt: self.compose_system_prompt(agent_id, opts.user_context.as_deref()),
            model: agent.model.clone(),
            allowed_tools,
            max_turns: agent.max_turns,
            manifest_path: manifest.clone(),
            working_dir: self.registry.agent_dir(agent_id),
            resume_session_id: self.session_map.get(&conversation_id),
            timeout: self.timeout,
        };

        let attempted_resume = request.resume_session_id.is_some();
        let outcome = match self.runner.run(request.clone()).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if attempted_resume => {
                // Resume ids are opaque; a dead one means the external
                // session expired. Fall back to a fresh session and
                // overwrite the mapping.
                tracing::warn!(
                    conversation = %conversation_id,
                    error = %e,
                    "resume failed, starting fresh session"
                );
                request.resume_session_id = None;
                self.runner.run(request).await
            }
            Err(e) => Err(e),
        };

        if let Some(path) = &manifest {
            self.supervisor.discard_manifest(path);
        }
        let outcome = outcome?;

        // The map is the resume authority: persist it before touching the
        // session row, so a crash between the two heals on the next send.
        if let Some(session_id) = &outcome.session_id {
            self.session_map.insert(&conversation_id, session_id)?;
        }

        let channel = opts.channel.clone().unwrap_or_default();
        match self.store.get_session(&conversation_id).await? {
            Some(_) => {
                self.store
                    .touch_session(&conversation_id, SessionStatus::Active, 1)
                    .await?;
            }
            None => {
                let now = now_ms();
                self.store
                    .upsert_session(SessionRow {
                        conversation_id: conversation_id.clone(),
                        agent_id: agent_id.to_string(),
                        channel,
                        status: SessionStatus::Active,
                        turn_count: 1,
                        created_at_ms: now,
                        last_active_at_ms: now,
                    })
                    .await?;
            }
        }

        self.activity.record(
            agent_id,
            "session.send",
            format!("conversation {}", conversation_id),
        );

        Ok(SendOutcome {
            conversation_id,
            session_id: outcome.session_id,
            text: outcome.text,
            steps: outcome.steps,
        })
    }

    /// Sends into a known conversation, resuming its external session.
    /// Unknown conversations fail with [`SessionError::NotFound`].
    pub async fn resume_session(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<SendOutcome, SessionError> {
        let row = self
            .store
            .get_session(conversation_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(conversation_id.to_string()))?;
        self.send_message(
            &row.agent_id,
            text,
            SendOptions {
                conversation_id: Some(conversation_id.to_string()),
                channel: Some(row.channel.clone()),
                user_context: None,
            },
        )
        .await
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionRow>, SessionError> {
        Ok(self.store.list_sessions().await?)
    }

    pub async fn session_status(
        &self,
        conversation_id: &str,
    ) -> Result<SessionRow, SessionError> {
        self.store
            .get_session(conversation_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(conversation_id.to_string()))
    }

    /// The external session id currently mapped to a conversation.
    pub fn external_session_id(&self, conversation_id: &str) -> Option<String> {
        self.session_map.get(conversation_id)
    }
}
