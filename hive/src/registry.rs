//! Agent registry: per-agent on-disk layout and lookup.
//!
//! Every configured agent owns a directory under `<root>/agents/<slug>/`
//! holding its identity seed (`SOUL.md`), heartbeat checklist
//! (`HEARTBEAT.md`), curated memory (`MEMORY.md`), workspace scratchpad
//! (`TOOLS.md`), daily logs under `memory/`, and version history under
//! `history/`. The registry creates missing pieces with defaults and is the
//! single authority on which slugs exist.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use config::AgentConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_-]+$").expect("slug regex"));

const DEFAULT_SOUL: &str = "# Soul\n\nYou are a helpful, persistent agent. \
Decide who you are and keep notes in MEMORY.md.\n";
const DEFAULT_HEARTBEAT: &str = "# Heartbeat\n\n\
Review this checklist on every heartbeat:\n\n\
- [ ] Anything waiting on you?\n";
const DEFAULT_MEMORY: &str = "# Memory\n";
const DEFAULT_TOOLS: &str = "# Tools\n\nWorkspace notes about available tools.\n";

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("agent not found: {0}")]
    AgentNotFound(String),
    #[error("invalid agent slug: {0}")]
    InvalidSlug(String),
    #[error("agent layout: {0}")]
    Io(#[from] std::io::Error),
}

/// Registered agents and their on-disk layout under `<root>/agents/`.
pub struct AgentRegistry {
    root: PathBuf,
    agents: RwLock<BTreeMap<String, AgentConfig>>,
}

impl AgentRegistry {
    /// Builds the registry from the configured agent map, ensuring the
    /// on-disk layout of every agent exists.
    pub fn new(
        root: impl Into<PathBuf>,
        agents: BTreeMap<String, AgentConfig>,
    ) -> Result<Self, RegistryError> {
        let registry = Self {
            root: root.into(),
            agents: RwLock::new(BTreeMap::new()),
        };
        for (slug, cfg) in agents {
            registry.register(&slug, cfg)?;
        }
        Ok(registry)
    }

    /// Registers an agent, creating its directory with default files if
    /// absent. Creation is atomic per agent: the layout is staged in a
    /// temporary directory and renamed into place.
    pub fn register(&self, slug: &str, cfg: AgentConfig) -> Result<(), RegistryError> {
        if !SLUG_RE.is_match(slug) {
            return Err(RegistryError::InvalidSlug(slug.to_string()));
        }
        let dir = self.agent_dir(slug);
        if !dir.exists() {
            let staging = self
                .root
                .join("agents")
                .join(format!(".staging-{}", slug));
            if staging.exists() {
                std::fs::remove_dir_all(&staging)?;
            }
            Self::write_layout(&staging)?;
            std::fs::rename(&staging, &dir)?;
            tracing::info!(agent = slug, "created agent layout");
        } else {
            Self::fill_missing(&dir)?;
        }
        self.agents
            .write()
            .expect("registry lock")
            .insert(slug.to_string(), cfg);
        Ok(())
    }

    /// Removes an agent from the registry. On-disk artifacts are deleted
    /// only when `delete_files` is set.
    pub fn remove(&self, slug: &str, delete_files: bool) -> Result<(), RegistryError> {
        let removed = self
            .agents
            .write()
            .expect("registry lock")
            .remove(slug)
            .is_some();
        if !removed {
            return Err(RegistryError::AgentNotFound(slug.to_string()));
        }
        if delete_files {
            let dir = self.agent_dir(slug);
            if dir.exists() {
                std::fs::remove_dir_all(dir)?;
            }
        }
        Ok(())
    }

    /// Looks up an agent's configuration. Unknown slugs fail loudly.
    pub fn get(&self, slug: &str) -> Result<AgentConfig, RegistryError> {
        self.agents
            .read()
            .expect("registry lock")
            .get(slug)
            .cloned()
            .ok_or_else(|| RegistryError::AgentNotFound(slug.to_string()))
    }

    pub fn is_registered(&self, slug: &str) -> bool {
        self.agents.read().expect("registry lock").contains_key(slug)
    }

    /// Registered slugs in sorted order.
    pub fn list(&self) -> Vec<String> {
        self.agents.read().expect("registry lock").keys().cloned().collect()
    }

    pub fn data_root(&self) -> &Path {
        &self.root
    }

    pub fn agent_dir(&self, slug: &str) -> PathBuf {
        self.root.join("agents").join(slug)
    }

    pub fn soul_path(&self, slug: &str) -> PathBuf {
        self.agent_dir(slug).join("SOUL.md")
    }

    pub fn memory_path(&self, slug: &str) -> PathBuf {
        self.agent_dir(slug).join("MEMORY.md")
    }

    pub fn heartbeat_path(&self, slug: &str) -> PathBuf {
        self.agent_dir(slug).join("HEARTBEAT.md")
    }

    pub fn tools_path(&self, slug: &str) -> PathBuf {
        self.agent_dir(slug).join("TOOLS.md")
    }

    /// Per-agent chunk/FTS/embedding database.
    pub fn memory_db_path(&self, slug: &str) -> PathBuf {
        self.agent_dir(slug).join("memory.db")
    }

    fn write_layout(dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(dir.join("memory").join("archive"))?;
        std::fs::create_dir_all(dir.join("history"))?;
        std::fs::write(dir.join("SOUL.md"), DEFAULT_SOUL)?;
        std::fs::write(dir.join("HEARTBEAT.md"), DEFAULT_HEARTBEAT)?;
        std::fs::write(dir.join("MEMORY.md"), DEFAULT_MEMORY)?;
        std::fs::write(dir.join("TOOLS.md"), DEFAULT_TOOLS)?;
        Ok(())
    }

    fn fill_missing(dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(dir.join("memory").join("archive"))?;
        std::fs::create_dir_all(dir.join("history"))?;
        for (file, default) in [
            ("SOUL.md", DEFAULT_SOUL),
            ("HEARTBEAT.md", DEFAULT_HEARTBEAT),
            ("MEMORY.md", DEFAULT_MEMORY),
            ("TOOLS.md", DEFAULT_TOOLS),
        ] {
            let path = dir.join(file);
            if !path.exists() {
                std::fs::write(path, default)?;
            }
        }
        Ok(())
    }
}
