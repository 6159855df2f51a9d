//! Loopback channel adapter for tests and local development.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChannelAdapter, ChannelError, InboundMessage};

/// In-memory adapter: records outbound sends, replays injected inbound
/// events into the installed sink.
pub struct MockAdapter {
    name: String,
    connected: AtomicBool,
    sent: Mutex<Vec<(String, String, Option<String>)>>,
    typing: Mutex<Vec<String>>,
    inbound: Mutex<Option<tokio::sync::mpsc::Sender<InboundMessage>>>,
}

impl MockAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connected: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            typing: Mutex::new(Vec::new()),
            inbound: Mutex::new(None),
        }
    }

    /// Outbound messages recorded so far as `(to, text, thread_id)`.
    pub fn sent(&self) -> Vec<(String, String, Option<String>)> {
        self.sent.lock().expect("mock lock").clone()
    }

    pub fn typing_targets(&self) -> Vec<String> {
        self.typing.lock().expect("mock lock").clone()
    }

    /// Injects an inbound event as if it arrived from the wire.
    pub async fn push_inbound(&self, msg: InboundMessage) {
        let tx = self.inbound.lock().expect("mock lock").clone();
        match tx {
            Some(tx) => {
                if tx.send(msg).await.is_err() {
                    tracing::warn!(channel = %self.name, "inbound sink closed, dropping event");
                }
            }
            None => tracing::warn!(channel = %self.name, "no inbound sink installed"),
        }
    }
}

#[async_trait]
impl ChannelAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<(), ChannelError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ChannelError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn send_message(
        &self,
        to: &str,
        text: &str,
        thread_id: Option<&str>,
    ) -> Result<(), ChannelError> {
        self.sent.lock().expect("mock lock").push((
            to.to_string(),
            text.to_string(),
            thread_id.map(String::from),
        ));
        Ok(())
    }

    async fn send_typing(&self, to: &str) -> Result<(), ChannelError> {
        self.typing.lock().expect("mock lock").push(to.to_string());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set_inbound(&self, tx: tokio::sync::mpsc::Sender<InboundMessage>) {
        *self.inbound.lock().expect("mock lock") = Some(tx);
    }
}
