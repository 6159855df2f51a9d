//! # Hive
//!
//! Agent runtime core for a local multi-agent orchestration platform: it
//! turns a single interactive LLM CLI into a fleet of long-lived,
//! channel-connected, memory-equipped agents.
//!
//! ## Main modules
//!
//! - [`registry`]: per-agent on-disk layout (`SOUL.md`, `MEMORY.md`,
//!   `HEARTBEAT.md`, daily logs) and slug lookup ([`AgentRegistry`]).
//! - [`store`]: embedded SQL store of sessions, user mappings, cron jobs,
//!   deferred tasks ([`Store`]).
//! - [`memory`]: chunked full-text + vector hybrid index per agent, with
//!   consolidation and archival ([`MemoryStore`], [`Embedder`]).
//! - [`session`]: LLM subprocess lifecycle, resume-by-id, transcript
//!   parsing, per-conversation serialization ([`SessionManager`],
//!   [`AgentRunner`], [`CliRunner`], [`MockRunner`]).
//! - [`toolserver`]: per-invocation tool-server manifests with injected
//!   agent environment ([`ToolServerSupervisor`]).
//! - [`router`]: @mention → rules → user mapping → default resolution and
//!   conversation keys ([`Router`]).
//! - [`channel`]: the adapter SPI and normalized inbound events
//!   ([`ChannelAdapter`], [`InboundMessage`], [`Channels`]).
//! - [`schedule`]: cron jobs, heartbeats with active-hour gating, and the
//!   one-shot task queue ([`CronScheduler`], [`HeartbeatScheduler`],
//!   [`TaskQueue`]).
//! - [`ralph`]: the autonomous work loop over `PLAN.md`
//!   ([`RalphLoop`], [`parse_plan`], [`update_task_status`]).
//! - [`collab`]: delegations, topics, subscriptions, shared memory
//!   ([`Collaboration`]).
//! - [`ipc`]: the Unix-socket hub and request handlers ([`IpcHub`],
//!   [`Handlers`]); wire types live in the `ipc-proto` crate.
//! - [`orchestrator`]: wiring and lifecycle ([`Orchestrator`]).

pub mod activity;
pub mod channel;
pub mod collab;
pub mod fsutil;
pub mod ipc;
pub mod memory;
pub mod orchestrator;
pub mod ralph;
pub mod registry;
pub mod router;
pub mod schedule;
pub mod session;
pub mod store;
pub mod toolserver;

pub use activity::{ActivityEntry, ActivityLog};
pub use channel::{ChannelAdapter, ChannelError, Channels, InboundMessage, MockAdapter};
pub use collab::{Collaboration, CollabError, Delegation, DelegationStatus};
pub use ipc::{Handlers, IpcError, IpcHub};
pub use memory::{Embedder, HashEmbedder, MemoryError, MemoryStore, OpenAIEmbedder};
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use ralph::{parse_plan, update_task_status, RalphConfig, RalphError, RalphLoop, RalphSummary};
pub use registry::{AgentRegistry, RegistryError};
pub use router::{RouteDecision, Router, RouterError};
pub use schedule::{
    CronScheduler, HeartbeatScheduler, MemoryMaintenance, ScheduleError, TaskQueue,
};
pub use session::{
    AgentRunner, CliRunner, MockRunner, RunOutcome, RunRequest, SendOptions, SendOutcome,
    SessionError, SessionManager,
};
pub use store::{CronJob, QueuedTask, SessionRow, SessionStatus, Store, StoreError, TaskStatus};
pub use toolserver::ToolServerSupervisor;
