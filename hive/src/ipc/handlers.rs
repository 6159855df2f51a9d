//! IPC request handlers: validate, dispatch to the owning subsystem, shape
//! the uniform response envelope.
//!
//! Downstream errors never escape: every failure becomes `{ok:false,error}`.

use std::sync::Arc;

use ipc_proto::{IpcRequest, IpcResponse};
use serde_json::json;

use crate::channel::Channels;
use crate::registry::AgentRegistry;
use crate::session::{SendOptions, SessionManager};

pub struct Handlers {
    sessions: Arc<SessionManager>,
    registry: Arc<AgentRegistry>,
    channels: Arc<Channels>,
}

impl Handlers {
    pub fn new(
        sessions: Arc<SessionManager>,
        registry: Arc<AgentRegistry>,
        channels: Arc<Channels>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions,
            registry,
            channels,
        })
    }

    pub async fn dispatch(&self, request: IpcRequest) -> IpcResponse {
        match request {
            IpcRequest::SessionsList {} => self.sessions_list().await,
            IpcRequest::SessionsSpawn {
                agent,
                prompt,
                conversation_id,
            } => self.sessions_spawn(agent, prompt, conversation_id).await,
            IpcRequest::SessionsSend {
                conversation_id,
                text,
            } => self.sessions_send(conversation_id, text).await,
            IpcRequest::SessionsStatus { conversation_id } => {
                self.sessions_status(conversation_id).await
            }
            IpcRequest::AgentsList {} => {
                IpcResponse::ok(json!({ "agents": self.registry.list() }))
            }
            IpcRequest::MessagingSend {
                channel,
                to,
                text,
                thread_id,
            } => self.messaging_send(channel, to, text, thread_id).await,
            IpcRequest::MessagingTyping { channel, to } => {
                self.messaging_typing(channel, to).await
            }
            IpcRequest::MessagingChannelInfo { channel } => self.channel_info(channel),
        }
    }

    async fn sessions_list(&self) -> IpcResponse {
        match self.sessions.list_sessions().await {
            Ok(sessions) => IpcResponse::ok(json!({ "sessions": sessions })),
            Err(e) => IpcResponse::error(e.to_string()),
        }
    }

    async fn sessions_spawn(
        &self,
        agent: String,
        prompt: String,
        conversation_id: Option<String>,
    ) -> IpcResponse {
        if agent.is_empty() || prompt.is_empty() {
            return IpcResponse::error("agent and prompt are required");
        }
        let opts = SendOptions {
            conversation_id,
            ..Default::default()
        };
        match self.sessions.send_message(&agent, &prompt, opts).await {
            Ok(outcome) => IpcResponse::ok(json!({
                "conversation_id": outcome.conversation_id,
                "session_id": outcome.session_id,
                "text": outcome.text,
            })),
            Err(e) => IpcResponse::error(e.to_string()),
        }
    }

    async fn sessions_send(&self, conversation_id: String, text: String) -> IpcResponse {
        if conversation_id.is_empty() || text.is_empty() {
            return IpcResponse::error("conversation_id and text are required");
        }
        match self.sessions.resume_session(&conversation_id, &text).await {
            Ok(outcome) => IpcResponse::ok(json!({
                "conversation_id": outcome.conversation_id,
                "session_id": outcome.session_id,
                "text": outcome.text,
            })),
            Err(e) => IpcResponse::error(e.to_string()),
        }
    }

    async fn sessions_status(&self, conversation_id: String) -> IpcResponse {
        if conversation_id.is_empty() {
            return IpcResponse::error("conversation_id is required");
        }
        match self.sessions.session_status(&conversation_id).await {
            Ok(row) => IpcResponse::ok(json!({ "session": row })),
            Err(e) => IpcResponse::error(e.to_string()),
        }
    }

    async fn messaging_send(
        &self,
        channel: String,
        to: String,
        text: String,
        thread_id: Option<String>,
    ) -> IpcResponse {
        if channel.is_empty() || to.is_empty() {
            return IpcResponse::error("channel and to are required");
        }
        let adapter = match self.channels.get(&channel) {
            Ok(adapter) => adapter,
            Err(e) => return IpcResponse::error(e.to_string()),
        };
        match adapter.send_message(&to, &text, thread_id.as_deref()).await {
            Ok(()) => IpcResponse::ok(json!({})),
            Err(e) => IpcResponse::error(e.to_string()),
        }
    }

    async fn messaging_typing(&self, channel: String, to: String) -> IpcResponse {
        let adapter = match self.channels.get(&channel) {
            Ok(adapter) => adapter,
            Err(e) => return IpcResponse::error(e.to_string()),
        };
        match adapter.send_typing(&to).await {
            Ok(()) => IpcResponse::ok(json!({})),
            Err(e) => IpcResponse::error(e.to_string()),
        }
    }

    fn channel_info(&self, channel: String) -> IpcResponse {
        match self.channels.get(&channel) {
            Ok(adapter) => IpcResponse::ok(json!({
                "channel": channel,
                "connected": adapter.is_connected(),
            })),
            Err(e) => IpcResponse::error(e.to_string()),
        }
    }
}
