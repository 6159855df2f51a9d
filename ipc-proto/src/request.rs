//! Request side of the IPC protocol: a closed set of typed messages.
//!
//! The wire form is a single JSON object with a `type` tag and the payload
//! fields inline, e.g. `{"type":"sessions.send","conversation_id":"…","text":"…"}`.

use serde::{Deserialize, Serialize};

/// A single IPC request. The set is closed: anything else on the wire is
/// answered with an error envelope naming the unknown type.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum IpcRequest {
    /// List known sessions.
    #[serde(rename = "sessions.list")]
    SessionsList {},
    /// Spawn a fresh session for an agent and send the first prompt.
    #[serde(rename = "sessions.spawn")]
    SessionsSpawn {
        agent: String,
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
    },
    /// Send a message into an existing conversation.
    #[serde(rename = "sessions.send")]
    SessionsSend {
        conversation_id: String,
        text: String,
    },
    /// Status of one conversation.
    #[serde(rename = "sessions.status")]
    SessionsStatus { conversation_id: String },
    /// List registered agents.
    #[serde(rename = "agents.list")]
    AgentsList {},
    /// Send an outbound message through a connected channel adapter.
    #[serde(rename = "messaging.send")]
    MessagingSend {
        channel: String,
        to: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
    },
    /// Send a typing indicator through a channel adapter.
    #[serde(rename = "messaging.typing")]
    MessagingTyping { channel: String, to: String },
    /// Connection info for one channel adapter.
    #[serde(rename = "messaging.channel_info")]
    MessagingChannelInfo { channel: String },
}

/// Why a raw request line could not be turned into an [`IpcRequest`].
#[derive(Clone, Debug, PartialEq)]
pub enum RequestParseError {
    /// The `type` tag named a message outside the closed set.
    UnknownType(String),
    /// Not a JSON object, missing `type`, or payload fields invalid.
    Malformed(String),
}

impl std::fmt::Display for RequestParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestParseError::UnknownType(t) => {
                write!(f, "Unknown IPC message type: {}", t)
            }
            RequestParseError::Malformed(e) => write!(f, "invalid IPC request: {}", e),
        }
    }
}

impl std::error::Error for RequestParseError {}

/// Known `type` tags, used to tell "unknown type" apart from "bad payload".
const KNOWN_TYPES: &[&str] = &[
    "sessions.list",
    "sessions.spawn",
    "sessions.send",
    "sessions.status",
    "agents.list",
    "messaging.send",
    "messaging.typing",
    "messaging.channel_info",
];

/// Parses one raw request object. An unrecognized `type` tag yields
/// [`RequestParseError::UnknownType`] carrying the tag verbatim so the hub
/// can echo it back in the error envelope.
pub fn parse_request(raw: &str) -> Result<IpcRequest, RequestParseError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| RequestParseError::Malformed(e.to_string()))?;
    let tag = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| RequestParseError::Malformed("missing \"type\" field".into()))?;
    if !KNOWN_TYPES.contains(&tag) {
        return Err(RequestParseError::UnknownType(tag.to_string()));
    }
    serde_json::from_value(value).map_err(|e| RequestParseError::Malformed(e.to_string()))
}
