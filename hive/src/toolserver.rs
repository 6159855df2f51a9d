//! Tool-server supervision: composing the per-invocation manifest the LLM
//! CLI consumes.
//!
//! Tool servers are pre-existing external binaries speaking line-delimited
//! JSON-RPC over stdio; the CLI launches them from the manifest. The
//! orchestrator's job here is selection and environment: each server gets
//! the agent slug, the data root, and the IPC socket path so it can call
//! back into the hub.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use config::ToolServerDef;
use serde_json::json;

/// Env var carrying the calling agent's slug into tool-server processes.
pub const ENV_AGENT: &str = "HIVE_AGENT";
/// Env var carrying the data root.
pub const ENV_HOME: &str = "HIVE_HOME";
/// Env var carrying the IPC socket path.
pub const ENV_IPC_SOCKET: &str = "HIVE_IPC_SOCKET";

pub struct ToolServerSupervisor {
    root: PathBuf,
    servers: BTreeMap<String, ToolServerDef>,
    socket_path: PathBuf,
}

impl ToolServerSupervisor {
    pub fn new(
        root: impl Into<PathBuf>,
        servers: BTreeMap<String, ToolServerDef>,
        socket_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            root: root.into(),
            servers,
            socket_path: socket_path.into(),
        }
    }

    /// Writes the tool-server manifest for one invocation and returns its
    /// path, or `None` when the agent has no servers enabled. Unknown
    /// server names are logged and skipped.
    pub fn compose_manifest(
        &self,
        agent_id: &str,
        enabled: &[String],
    ) -> std::io::Result<Option<PathBuf>> {
        if enabled.is_empty() {
            return Ok(None);
        }

        let mut servers = serde_json::Map::new();
        for name in enabled {
            let Some(def) = self.servers.get(name) else {
                tracing::warn!(agent = agent_id, server = %name, "unknown tool server, skipping");
                continue;
            };
            let mut env = def.env.clone();
            env.insert(ENV_AGENT.to_string(), agent_id.to_string());
            env.insert(ENV_HOME.to_string(), self.root.display().to_string());
            env.insert(
                ENV_IPC_SOCKET.to_string(),
                self.socket_path.display().to_string(),
            );
            servers.insert(
                name.clone(),
                json!({
                    "command": def.command,
                    "args": def.args,
                    "env": env,
                }),
            );
        }
        if servers.is_empty() {
            return Ok(None);
        }

        let manifest = json!({ "toolServers": servers });
        let dir = self.root.join("runtime");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!(
            "tool-config-{}-{}.json",
            agent_id,
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&path, serde_json::to_string_pretty(&manifest)?)?;
        Ok(Some(path))
    }

    /// Best-effort removal of a manifest after its invocation finished.
    pub fn discard_manifest(&self, path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::debug!(error = %e, path = %path.display(), "manifest cleanup failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor(root: &Path) -> ToolServerSupervisor {
        let mut servers = BTreeMap::new();
        servers.insert(
            "memory".to_string(),
            ToolServerDef {
                command: "hive-memory-server".to_string(),
                args: vec!["--stdio".to_string()],
                env: BTreeMap::from([("LOG_LEVEL".to_string(), "info".to_string())]),
            },
        );
        ToolServerSupervisor::new(root, servers, root.join("ipc-1.sock"))
    }

    #[test]
    fn manifest_injects_agent_environment() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path());
        let path = sup
            .compose_manifest("jarvis", &["memory".to_string()])
            .unwrap()
            .unwrap();

        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let server = &manifest["toolServers"]["memory"];
        assert_eq!(server["command"], "hive-memory-server");
        assert_eq!(server["env"]["HIVE_AGENT"], "jarvis");
        assert_eq!(server["env"]["LOG_LEVEL"], "info");
        assert_eq!(
            server["env"]["HIVE_IPC_SOCKET"],
            dir.path().join("ipc-1.sock").display().to_string()
        );
    }

    #[test]
    fn no_enabled_servers_means_no_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path());
        assert!(sup.compose_manifest("jarvis", &[]).unwrap().is_none());
    }

    #[test]
    fn unknown_servers_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path());
        let path = sup
            .compose_manifest("jarvis", &["missing".to_string()])
            .unwrap();
        assert!(path.is_none());
    }
}
