//! Tolerant parsing of the LLM CLI's line-delimited JSON transcript.
//!
//! The subprocess emits one JSON object per line: an `init` line carrying
//! the external session id, `assistant` text blocks, `tool_use` steps, and
//! a final `result`. Malformed lines are skipped; if the stream ends
//! without a `result`, the last assistant block (or raw line) is the
//! best-effort final text.

use serde::Deserialize;

/// One recorded tool invocation, kept for the observability feed.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolStep {
    pub name: String,
    pub input: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TranscriptEvent {
    Init {
        session_id: String,
    },
    Assistant {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    Result {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    #[serde(other)]
    Other,
}

/// Accumulated view of one subprocess transcript.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    pub session_id: Option<String>,
    pub final_text: Option<String>,
    pub steps: Vec<ToolStep>,
    last_assistant: Option<String>,
    last_raw: Option<String>,
}

impl Transcript {
    /// Feeds one raw line. Malformed or unknown lines are skipped (the raw
    /// text is remembered as a last resort for best-effort output).
    pub fn absorb(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match serde_json::from_str::<TranscriptEvent>(line) {
            Ok(TranscriptEvent::Init { session_id }) => {
                self.session_id = Some(session_id);
            }
            Ok(TranscriptEvent::Assistant { text }) => {
                self.last_assistant = Some(text);
            }
            Ok(TranscriptEvent::ToolUse { name, input }) => {
                self.steps.push(ToolStep { name, input });
            }
            Ok(TranscriptEvent::Result { text, session_id }) => {
                if let Some(id) = session_id {
                    self.session_id = Some(id);
                }
                self.final_text = text;
            }
            Ok(TranscriptEvent::Other) => {}
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed transcript line");
                self.last_raw = Some(line.to_string());
            }
        }
    }

    /// The final assistant text, falling back to the last assistant block,
    /// then the last raw line.
    pub fn final_or_best_effort(&self) -> String {
        self.final_text
            .clone()
            .or_else(|| self.last_assistant.clone())
            .or_else(|| self.last_raw.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absorbs_full_transcript() {
        let mut t = Transcript::default();
        t.absorb(r#"{"type":"init","session_id":"abc"}"#);
        t.absorb(r#"{"type":"tool_use","name":"Read","input":{"path":"x"}}"#);
        t.absorb(r#"{"type":"assistant","text":"thinking"}"#);
        t.absorb(r#"{"type":"result","text":"done","session_id":"abc"}"#);
        assert_eq!(t.session_id.as_deref(), Some("abc"));
        assert_eq!(t.final_or_best_effort(), "done");
        assert_eq!(
            t.steps,
            vec![ToolStep {
                name: "Read".into(),
                input: json!({"path": "x"})
            }]
        );
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let mut t = Transcript::default();
        t.absorb("{not json");
        t.absorb(r#"{"type":"assistant","text":"still here"}"#);
        assert_eq!(t.final_or_best_effort(), "still here");
    }

    #[test]
    fn unknown_event_types_are_ignored() {
        let mut t = Transcript::default();
        t.absorb(r#"{"type":"usage","tokens":12}"#);
        t.absorb(r#"{"type":"result","text":"ok"}"#);
        assert_eq!(t.final_or_best_effort(), "ok");
    }

    #[test]
    fn missing_result_falls_back_to_raw() {
        let mut t = Transcript::default();
        t.absorb("plain text tail");
        assert_eq!(t.final_or_best_effort(), "plain text tail");
    }
}
