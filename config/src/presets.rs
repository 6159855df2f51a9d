//! Tool presets: named capability budgets resolved to allowed-tool lists.
//!
//! The mapping is a static table. `custom` uses the agent's explicit list,
//! `none` resolves to nothing. Entries are either native tool names or
//! `mcp__<server>__*` wildcards covering a whole tool-server family.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolPreset {
    #[default]
    None,
    Coding,
    Messaging,
    Full,
    Custom,
}

/// Native tools plus memory access for agents doing repository work.
const CODING_TOOLS: &[&str] = &[
    "Bash",
    "Read",
    "Write",
    "Edit",
    "Glob",
    "Grep",
    "WebFetch",
    "mcp__memory__*",
];

/// Read-mostly surface for conversational agents.
const MESSAGING_TOOLS: &[&str] = &[
    "Read",
    "WebFetch",
    "WebSearch",
    "mcp__memory__*",
    "mcp__messaging__*",
    "mcp__sessions__*",
];

/// Everything the other presets grant.
const FULL_TOOLS: &[&str] = &[
    "Bash",
    "Read",
    "Write",
    "Edit",
    "Glob",
    "Grep",
    "WebFetch",
    "WebSearch",
    "mcp__memory__*",
    "mcp__messaging__*",
    "mcp__sessions__*",
];

/// Resolves a preset to the concrete allowed-tool list.
///
/// * `custom_tools`: the agent's explicit list, consulted only for
///   [`ToolPreset::Custom`].
/// * `tool_servers`: enabled tool-server names; `full` additionally grants
///   a `mcp__<server>__*` wildcard for each.
pub fn resolve_allowed_tools(
    preset: ToolPreset,
    custom_tools: &[String],
    tool_servers: &[String],
) -> Vec<String> {
    match preset {
        ToolPreset::None => Vec::new(),
        ToolPreset::Custom => custom_tools.to_vec(),
        ToolPreset::Coding => CODING_TOOLS.iter().map(|s| s.to_string()).collect(),
        ToolPreset::Messaging => MESSAGING_TOOLS.iter().map(|s| s.to_string()).collect(),
        ToolPreset::Full => {
            let mut tools: Vec<String> = FULL_TOOLS.iter().map(|s| s.to_string()).collect();
            for server in tool_servers {
                let pattern = format!("mcp__{}__*", server);
                if !tools.contains(&pattern) {
                    tools.push(pattern);
                }
            }
            tools
        }
    }
}
