//! Message router: maps inbound channel events to agents and conversation
//! keys.
//!
//! Resolution order, first win: @mention of a registered agent, declared
//! routing rules, the user-mapping table, then the default agent. The
//! session key groups messages into conversations: group contexts share a
//! conversation per chat id, DMs are per-user.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use config::RoutingRule;

use crate::channel::InboundMessage;
use crate::store::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("no route for message from {user} on {channel}")]
    NoRoute { channel: String, user: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where a message goes: the resolved agent, the conversation key, and the
/// text with any consumed @mention stripped.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteDecision {
    pub agent_id: String,
    pub session_key: String,
    pub text: String,
}

pub struct Router {
    agents: RwLock<HashSet<String>>,
    rules: Vec<RoutingRule>,
    default_agent: Option<String>,
    store: Arc<Store>,
}

impl Router {
    pub fn new(
        agents: impl IntoIterator<Item = String>,
        rules: Vec<RoutingRule>,
        default_agent: Option<String>,
        store: Arc<Store>,
    ) -> Self {
        Self {
            agents: RwLock::new(agents.into_iter().collect()),
            rules,
            default_agent,
            store,
        }
    }

    /// Makes a newly registered agent mentionable without restart.
    pub fn add_agent(&self, slug: &str) {
        self.agents
            .write()
            .expect("router lock")
            .insert(slug.to_string());
    }

    pub fn remove_agent(&self, slug: &str) {
        self.agents.write().expect("router lock").remove(slug);
    }

    /// Resolves one inbound message. The order is total as long as a
    /// default agent is configured.
    pub async fn route(&self, msg: &InboundMessage) -> Result<RouteDecision, RouterError> {
        if let Some((agent_id, text)) = self.match_mention(&msg.text) {
            return Ok(self.decide(msg, agent_id, text));
        }

        for rule in &self.rules {
            if rule.channel != msg.channel {
                continue;
            }
            if let Some(user) = &rule.channel_user_id {
                if user != &msg.user_id {
                    continue;
                }
            }
            if let Some(chat) = &rule.chat_id {
                if msg.chat_id.as_deref() != Some(chat.as_str()) {
                    continue;
                }
            }
            return Ok(self.decide(msg, rule.agent_id.clone(), msg.text.clone()));
        }

        if let Some(agent_id) = self.store.user_agent(&msg.channel, &msg.user_id).await? {
            return Ok(self.decide(msg, agent_id, msg.text.clone()));
        }

        if let Some(agent_id) = &self.default_agent {
            return Ok(self.decide(msg, agent_id.clone(), msg.text.clone()));
        }

        Err(RouterError::NoRoute {
            channel: msg.channel.clone(),
            user: msg.user_id.clone(),
        })
    }

    /// `@slug …` at the start of the trimmed text, case-insensitive, for a
    /// currently registered agent. Returns the slug and the text with the
    /// mention token (plus one trailing space) stripped.
    fn match_mention(&self, text: &str) -> Option<(String, String)> {
        let trimmed = text.trim_start();
        let rest = trimmed.strip_prefix('@')?;
        let token: String = rest
            .chars()
            .take_while(|c| !c.is_whitespace())
            .collect();
        if token.is_empty() {
            return None;
        }
        let slug = token.to_lowercase();
        if !self.agents.read().expect("router lock").contains(&slug) {
            return None;
        }
        let mut remainder = &rest[token.len()..];
        remainder = remainder.strip_prefix(' ').unwrap_or(remainder);
        Some((slug, remainder.to_string()))
    }

    fn decide(&self, msg: &InboundMessage, agent_id: String, text: String) -> RouteDecision {
        let session_key = match &msg.chat_id {
            Some(chat_id) => format!("{}:{}:{}", msg.channel, chat_id, agent_id),
            None => format!("{}:{}:{}", msg.channel, msg.user_id, agent_id),
        };
        RouteDecision {
            agent_id,
            session_key,
            text,
        }
    }
}
