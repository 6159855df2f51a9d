//! Channel adapter SPI: the uniform contract between the orchestrator and
//! channel transports (web chat, Telegram, Slack, Discord, …).
//!
//! Transports live outside the core; each one is a thin shim that
//! normalizes its wire events into [`InboundMessage`] at the boundary and
//! implements [`ChannelAdapter`] for outbound traffic. Adapter event loops
//! never propagate handler errors; they log and continue.

mod mock;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use mock::MockAdapter;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel connection: {0}")]
    Connection(String),
    #[error("channel send: {0}")]
    Send(String),
    #[error("unknown channel: {0}")]
    UnknownChannel(String),
    #[error("bad delivery target: {0}")]
    BadTarget(String),
}

/// One normalized inbound event. Adapters translate their duck-typed wire
/// payloads into this at the boundary; downstream components see only this
/// form. The raw payload rides along untouched for diagnostics.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub channel: String,
    pub user_id: String,
    /// Group/chat context, when the channel has one. DMs leave it empty.
    pub chat_id: Option<String>,
    pub text: String,
    pub thread_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub raw: serde_json::Value,
}

impl InboundMessage {
    pub fn new(
        channel: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            user_id: user_id.into(),
            chat_id: None,
            text: text.into(),
            thread_id: None,
            timestamp: Utc::now(),
            raw: serde_json::Value::Null,
        }
    }

    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }
}

/// The adapter contract. Implementations must be cheap to share
/// (`Arc<dyn ChannelAdapter>`).
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<(), ChannelError>;

    async fn disconnect(&self) -> Result<(), ChannelError>;

    async fn send_message(
        &self,
        to: &str,
        text: &str,
        thread_id: Option<&str>,
    ) -> Result<(), ChannelError>;

    /// Typing indicator. Channels that cannot express typing keep the
    /// default silent no-op.
    async fn send_typing(&self, _to: &str) -> Result<(), ChannelError> {
        Ok(())
    }

    fn is_connected(&self) -> bool;

    /// Installs the inbound sink. Adapters push every normalized event
    /// into it; a closed receiver is logged, never fatal.
    fn set_inbound(&self, tx: tokio::sync::mpsc::Sender<InboundMessage>);
}

/// The set of registered adapters, addressable by channel name and by
/// `"channel:target"` delivery strings.
#[derive(Default)]
pub struct Channels {
    adapters: RwLock<HashMap<String, Arc<dyn ChannelAdapter>>>,
}

impl Channels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, adapter: Arc<dyn ChannelAdapter>) {
        self.adapters
            .write()
            .expect("channels lock")
            .insert(adapter.name().to_string(), adapter);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ChannelAdapter>, ChannelError> {
        self.adapters
            .read()
            .expect("channels lock")
            .get(name)
            .cloned()
            .ok_or_else(|| ChannelError::UnknownChannel(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.adapters
            .read()
            .expect("channels lock")
            .keys()
            .cloned()
            .collect()
    }

    /// Splits a `"channel:target"` delivery string at the first colon.
    pub fn parse_target(target: &str) -> Result<(&str, &str), ChannelError> {
        match target.split_once(':') {
            Some((channel, to)) if !channel.is_empty() && !to.is_empty() => Ok((channel, to)),
            _ => Err(ChannelError::BadTarget(target.to_string())),
        }
    }

    /// Delivers text to a `"channel:target"` destination.
    pub async fn deliver(&self, target: &str, text: &str) -> Result<(), ChannelError> {
        let (channel, to) = Self::parse_target(target)?;
        self.get(channel)?.send_message(to, text, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_target_splits_at_first_colon() {
        assert_eq!(
            Channels::parse_target("slack:#alerts").unwrap(),
            ("slack", "#alerts")
        );
        assert_eq!(
            Channels::parse_target("telegram:user:42").unwrap(),
            ("telegram", "user:42")
        );
        assert!(Channels::parse_target("no-colon").is_err());
        assert!(Channels::parse_target(":empty").is_err());
    }

    #[tokio::test]
    async fn deliver_routes_to_registered_adapter() {
        let channels = Channels::new();
        let mock = Arc::new(MockAdapter::new("slack"));
        channels.register(mock.clone());

        channels.deliver("slack:#alerts", "hello").await.unwrap();
        let sent = mock.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "#alerts");
        assert_eq!(sent[0].1, "hello");

        assert!(matches!(
            channels.deliver("discord:#x", "hi").await,
            Err(ChannelError::UnknownChannel(_))
        ));
    }
}
