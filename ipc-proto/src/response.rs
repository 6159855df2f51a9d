//! Response side of the IPC protocol: the `{ok, …}` envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The single response shape: `{"ok":true, …payload}` on success,
/// `{"ok":false,"error":"…"}` on failure. Payload fields are carried
/// inline next to `ok`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IpcResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl IpcResponse {
    /// Success envelope. `payload` should be a JSON object; its fields are
    /// inlined next to `ok`. Non-object payloads are wrapped as `{"result": …}`.
    pub fn ok(payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };
        Self {
            ok: true,
            error: None,
            payload,
        }
    }

    /// Failure envelope with an error message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            payload: Map::new(),
        }
    }

    /// Serializes to the single-line wire form.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"ok":false,"error":"response serialization failed"}"#.to_string()
        })
    }
}
