//! Orchestrator wiring: one long-running process owning the registry, the
//! store, the session manager, the router, the schedulers, and the IPC hub.
//!
//! Data flow: channel adapter → router → session manager → LLM subprocess
//! → assistant reply → adapter outbound. Schedulers inject prompts through
//! the same send path, and tool servers call back through the hub.

use std::path::PathBuf;
use std::sync::Arc;

use config::Config;
use tokio_util::sync::CancellationToken;

use crate::activity::ActivityLog;
use crate::channel::{ChannelAdapter, Channels, InboundMessage};
use crate::collab::Collaboration;
use crate::ipc::{Handlers, IpcError, IpcHub};
use crate::registry::{AgentRegistry, RegistryError};
use crate::router::Router;
use crate::memory::HashEmbedder;
use crate::schedule::{
    CronScheduler, HeartbeatScheduler, MemoryMaintenance, ScheduleError, TaskQueue,
};
use crate::session::{AgentRunner, SendOptions, SessionManager};
use crate::store::{Store, StoreError};
use crate::toolserver::ToolServerSupervisor;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Ipc(#[from] IpcError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("orchestrator io: {0}")]
    Io(#[from] std::io::Error),
}

/// Capacity of the inbound event queue shared by all adapters.
const INBOUND_QUEUE: usize = 256;

const DEFAULT_USER_PROFILE: &str = "# User\n\nNotes about the human this fleet works for.\n";

/// Ensures the global user profile and its history directory exist.
fn ensure_user_profile(root: &std::path::Path) -> std::io::Result<()> {
    let profile = root.join("USER.md");
    if !profile.exists() {
        std::fs::write(profile, DEFAULT_USER_PROFILE)?;
    }
    std::fs::create_dir_all(root.join("user-history"))
}

pub struct Orchestrator {
    root: PathBuf,
    registry: Arc<AgentRegistry>,
    store: Arc<Store>,
    sessions: Arc<SessionManager>,
    router: Arc<Router>,
    channels: Arc<Channels>,
    activity: Arc<ActivityLog>,
    collab: Arc<Collaboration>,
    cron: Arc<CronScheduler>,
    heartbeats: Arc<HeartbeatScheduler>,
    maintenance: Arc<MemoryMaintenance>,
    queue: Arc<TaskQueue>,
    hub: IpcHub,
    inbound_tx: tokio::sync::mpsc::Sender<InboundMessage>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Builds and starts everything: ensures the data root and agent
    /// layouts, opens the store, binds the IPC socket (removing stale
    /// ones), starts schedulers and the inbound dispatch loop.
    pub async fn start(
        root: impl Into<PathBuf>,
        config: Config,
        runner: Arc<dyn AgentRunner>,
    ) -> Result<Self, OrchestratorError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        ensure_user_profile(&root)?;

        let registry = Arc::new(AgentRegistry::new(&root, config.agents.clone())?);
        let store = Arc::new(Store::open(root.join("orchestrator.db"))?);
        let activity = Arc::new(ActivityLog::new(root.join("activity.jsonl")));
        let channels = Arc::new(Channels::new());
        let collab = Arc::new(Collaboration::new(&root));

        crate::ipc::remove_stale_sockets(&root)?;
        let socket = crate::ipc::socket_path(&root);
        let supervisor = Arc::new(ToolServerSupervisor::new(
            &root,
            config.mcp.servers.clone(),
            &socket,
        ));

        let sessions = Arc::new(SessionManager::new(
            &root,
            Arc::clone(&registry),
            Arc::clone(&store),
            runner,
            supervisor,
            Arc::clone(&activity),
        ));

        let router = Arc::new(Router::new(
            registry.list(),
            config.routing.rules.clone(),
            config.routing.default_agent.clone(),
            Arc::clone(&store),
        ));

        let cancel = CancellationToken::new();
        let hub = IpcHub::bind(
            socket,
            Handlers::new(
                Arc::clone(&sessions),
                Arc::clone(&registry),
                Arc::clone(&channels),
            ),
            cancel.child_token(),
        )?;

        let cron = CronScheduler::new(
            Arc::clone(&store),
            Arc::clone(&sessions),
            Arc::clone(&channels),
            cancel.child_token(),
        );
        cron.start().await?;

        let heartbeats = HeartbeatScheduler::new(
            Arc::clone(&registry),
            Arc::clone(&sessions),
            Arc::clone(&channels),
            Arc::clone(&activity),
            cancel.child_token(),
        );
        heartbeats.start();

        let maintenance = MemoryMaintenance::new(
            Arc::clone(&registry),
            Arc::clone(&activity),
            Some(Arc::new(HashEmbedder::default())),
            cancel.child_token(),
        );
        maintenance.start();

        let queue = TaskQueue::new(
            Arc::clone(&store),
            Arc::clone(&sessions),
            cancel.child_token(),
        );
        queue.start();

        let (inbound_tx, inbound_rx) = tokio::sync::mpsc::channel(INBOUND_QUEUE);
        Self::spawn_inbound_loop(
            inbound_rx,
            Arc::clone(&router),
            Arc::clone(&sessions),
            Arc::clone(&channels),
            cancel.child_token(),
        );

        Ok(Self {
            root,
            registry,
            store,
            sessions,
            router,
            channels,
            activity,
            collab,
            cron,
            heartbeats,
            maintenance,
            queue,
            hub,
            inbound_tx,
            cancel,
        })
    }

    /// Registers and connects a channel adapter. A connection failure is
    /// logged and the adapter stays registered but disconnected, so a
    /// later reconnect can succeed.
    pub async fn register_adapter(&self, adapter: Arc<dyn ChannelAdapter>) {
        adapter.set_inbound(self.inbound_tx.clone());
        self.channels.register(Arc::clone(&adapter));
        if let Err(e) = adapter.connect().await {
            tracing::error!(channel = adapter.name(), error = %e, "adapter connect failed");
        }
    }

    fn spawn_inbound_loop(
        mut inbound_rx: tokio::sync::mpsc::Receiver<InboundMessage>,
        router: Arc<Router>,
        sessions: Arc<SessionManager>,
        channels: Arc<Channels>,
        cancel: CancellationToken,
    ) {
        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = inbound_rx.recv() => match msg {
                        Some(msg) => msg,
                        None => break,
                    },
                };
                let decision = match router.route(&msg).await {
                    Ok(decision) => decision,
                    Err(e) => {
                        tracing::warn!(channel = %msg.channel, error = %e, "unroutable message");
                        continue;
                    }
                };
                let outcome = sessions
                    .send_message(
                        &decision.agent_id,
                        &decision.text,
                        SendOptions {
                            conversation_id: Some(decision.session_key.clone()),
                            channel: Some(msg.channel.clone()),
                            user_context: Some(format!(
                                "Channel: {}. User: {}.",
                                msg.channel, msg.user_id
                            )),
                        },
                    )
                    .await;

                let reply = match outcome {
                    Ok(outcome) => outcome.text,
                    Err(e) => {
                        tracing::error!(conversation = %decision.session_key, error = %e, "send failed");
                        format!("(error: {})", e)
                    }
                };
                let to = msg.chat_id.as_deref().unwrap_or(&msg.user_id);
                let sent = match channels.get(&msg.channel) {
                    Ok(adapter) => {
                        adapter
                            .send_message(to, &reply, msg.thread_id.as_deref())
                            .await
                    }
                    Err(e) => Err(e),
                };
                if let Err(e) = sent {
                    tracing::error!(channel = %msg.channel, error = %e, "outbound send failed");
                }
            }
        });
    }

    pub fn data_root(&self) -> &PathBuf {
        &self.root
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn channels(&self) -> &Arc<Channels> {
        &self.channels
    }

    pub fn activity(&self) -> &Arc<ActivityLog> {
        &self.activity
    }

    pub fn collab(&self) -> &Arc<Collaboration> {
        &self.collab
    }

    pub fn cron(&self) -> &Arc<CronScheduler> {
        &self.cron
    }

    pub fn heartbeats(&self) -> &Arc<HeartbeatScheduler> {
        &self.heartbeats
    }

    pub fn maintenance(&self) -> &Arc<MemoryMaintenance> {
        &self.maintenance
    }

    pub fn task_queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    /// Stops timers, the queue, the inbound loop, and the hub (unlinking
    /// the socket).
    pub fn shutdown(&self) {
        self.cron.stop_all();
        self.heartbeats.stop_all();
        self.maintenance.stop_all();
        self.cancel.cancel();
        self.hub.shutdown();
    }
}
