//! Typed shape of `config.json`.
//!
//! Top-level sections that belong to out-of-core collaborators (channels,
//! gateway, skills, browser, backup) are carried as raw JSON objects: the
//! core validates that they are objects and hands them through untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::presets::ToolPreset;

/// The whole of `config.json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub version: i64,
    /// Agent slug → declared agent attributes.
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Tool-server definitions and the auto-approve list.
    #[serde(default)]
    pub mcp: McpConfig,
    /// Channel transport settings, opaque to the core.
    #[serde(default)]
    pub channels: Value,
    /// Admin gateway settings, opaque to the core.
    #[serde(default)]
    pub gateway: Value,
    /// Skill definitions, opaque to the core.
    #[serde(default)]
    pub skills: Value,
    /// Browser tool settings, opaque to the core.
    #[serde(default)]
    pub browser: Value,
    /// Backup tool settings, opaque to the core.
    #[serde(default)]
    pub backup: Value,
}

/// Declared attributes of one agent, keyed by slug in [`Config::agents`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Display name; defaults to the slug when empty.
    #[serde(default)]
    pub name: String,
    /// Model label passed to the LLM CLI.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tool_preset: ToolPreset,
    /// Explicit allowed-tool list, used only with [`ToolPreset::Custom`].
    #[serde(default)]
    pub custom_tools: Vec<String>,
    /// Names of enabled tool servers (keys into [`McpConfig::servers`]).
    #[serde(default)]
    pub tool_servers: Vec<String>,
    /// Skill names this agent carries.
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub heartbeat: Option<HeartbeatConfig>,
    /// Days between reflection passes over the daily logs.
    #[serde(default)]
    pub reflection_interval_days: Option<u32>,
    /// Max autonomous turns per LLM invocation.
    #[serde(default)]
    pub max_turns: Option<u32>,
    /// Where unsolicited output (heartbeats, cron results) goes,
    /// as `"channel:target"`.
    #[serde(default)]
    pub notify: Option<String>,
    /// Agent may administer other agents over IPC.
    #[serde(default)]
    pub admin: bool,
}

/// Heartbeat settings for one agent.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Named preset (`5m`, `15m`, `30m`, `1h`, `4h`, `daily`) or free-form
    /// `Nm`/`Nh`. Unknown values fall back to 30 minutes.
    #[serde(default)]
    pub interval: String,
    #[serde(default)]
    pub mode: HeartbeatMode,
    #[serde(default)]
    pub active_hours: Option<ActiveHours>,
    /// Drop the response when it is exactly `HEARTBEAT_OK`.
    #[serde(default)]
    pub suppress_ok: bool,
    /// Delivery target as `"channel:target"`.
    #[serde(default)]
    pub deliver_to: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatMode {
    /// Review the checklist and report.
    #[default]
    Check,
    /// Review the checklist and perform the work.
    Work,
}

/// A daily window in which heartbeat ticks are allowed.
///
/// `start`/`end` are `HH:MM` on a 24-hour 00–23 clock and are compared
/// lexicographically, so the window is correct only when `start <= end` in
/// clock order; windows spanning midnight never match after the gate.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveHours {
    pub start: String,
    pub end: String,
    /// IANA timezone name, e.g. `America/Los_Angeles`.
    pub timezone: String,
}

/// Ordered routing rules plus the fallback agent.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingConfig {
    #[serde(default)]
    pub default_agent: Option<String>,
    #[serde(default)]
    pub rules: Vec<RoutingRule>,
}

/// One routing rule; first declared match wins.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRule {
    pub channel: String,
    #[serde(default)]
    pub channel_user_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    pub agent_id: String,
}

/// Tool-server registry: launchable server definitions and the global
/// auto-approve list the LLM CLI consumes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpConfig {
    #[serde(default)]
    pub servers: BTreeMap<String, ToolServerDef>,
    #[serde(default)]
    pub auto_approve: Vec<String>,
}

/// How to launch one tool-server process.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolServerDef {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}
