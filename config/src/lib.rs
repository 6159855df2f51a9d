//! Load and validate `config.json` from the hive data root.
//!
//! Loading is three phases: substitute `${NAME}` environment tokens in the
//! raw text, validate the parsed JSON against the schema collecting **all**
//! violations (reported as JSON-pointer paths), then deserialize into the
//! typed [`Config`]. Any violation fails the load with [`ConfigError`].

mod env_subst;
mod presets;
mod schema;
mod types;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use env_subst::substitute_env;
pub use presets::{resolve_allowed_tools, ToolPreset};
pub use types::{
    ActiveHours, AgentConfig, Config, HeartbeatConfig, HeartbeatMode, McpConfig, RoutingConfig,
    RoutingRule, ToolServerDef,
};

/// Supported `version` value of `config.json`.
pub const CONFIG_VERSION: i64 = 5;

/// Directory name under the home directory when `HIVE_HOME` is unset.
const DEFAULT_ROOT_DIR: &str = ".hive";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config:\n{}", violations.join("\n"))]
    Invalid { violations: Vec<String> },
    #[error("data root: {0}")]
    DataRoot(String),
}

/// Resolves the data root: `HIVE_HOME` if set, else `~/.hive`.
pub fn data_root() -> Result<PathBuf, ConfigError> {
    if let Ok(root) = std::env::var("HIVE_HOME") {
        if !root.is_empty() {
            return Ok(PathBuf::from(root));
        }
    }
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_ROOT_DIR))
        .ok_or_else(|| ConfigError::DataRoot("home directory not found".into()))
}

/// Loads `config.json` from the given path.
///
/// `${NAME}` tokens in the raw text are replaced with environment values
/// before parsing (missing variables become the empty string). Schema
/// violations are collected exhaustively and reported together.
pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    load_str(&raw)
}

/// Same as [`load`], from an in-memory string.
pub fn load_str(raw: &str) -> Result<Config, ConfigError> {
    let expanded = substitute_env(raw);
    let value: serde_json::Value = serde_json::from_str(&expanded)?;

    let violations = schema::validate(&value);
    if !violations.is_empty() {
        return Err(ConfigError::Invalid { violations });
    }

    let config: Config = serde_json::from_value(value)?;
    Ok(config)
}
