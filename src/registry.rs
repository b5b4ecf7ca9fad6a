//! Multi-tenant agent registry.
//!
//! An agent pairs one document index with one embedding function under a
//! name, so several independent corpora can be served by the same
//! process. The registry is built once at startup from the config file
//! and passed to request handlers explicitly; there is no process-wide
//! store created at import time.
//!
//! The first registered agent becomes the default unless a later
//! registration claims default status. Re-registering a name overwrites
//! the previous agent.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result as AnyResult;
use tracing::{info, warn};

use crate::backend::{Hnsw, LinearCosine, SearchBackend};
use crate::config::Config;
use crate::embedding::{Embedder, HttpEmbedder};
use crate::error::{Error, Result};
use crate::index::EmbeddingIndex;

/// One tenant: a named index plus its embedding function.
pub struct Agent {
    pub name: String,
    pub data_dir: PathBuf,
    /// Per-agent threshold override; `None` means the global default.
    pub threshold: Option<f32>,
    pub index: EmbeddingIndex,
    pub embedder: Arc<dyn Embedder>,
}

/// Name-to-agent map with a designated default.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Agent>,
    default: Option<String>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent, optionally as the default.
    ///
    /// The first registration always becomes the default; a later one
    /// takes over only when `default` is true.
    pub fn register(&mut self, agent: Agent, default: bool) {
        if default || self.default.is_none() {
            self.default = Some(agent.name.clone());
        }
        info!(agent = %agent.name, documents = agent.index.len(), "agent registered");
        self.agents.insert(agent.name.clone(), agent);
    }

    /// Resolve an agent by name, falling back to the default.
    ///
    /// An unknown name resolves to the default when one exists. Fails
    /// with [`Error::NoAgentRegistered`] only when nothing can be
    /// resolved at all.
    pub fn resolve(&self, name: Option<&str>) -> Result<&Agent> {
        if let Some(name) = name {
            if let Some(agent) = self.agents.get(name) {
                return Ok(agent);
            }
        }
        self.default
            .as_deref()
            .and_then(|d| self.agents.get(d))
            .ok_or(Error::NoAgentRegistered)
    }

    /// Mutable variant of [`resolve`](Self::resolve), for offline indexing.
    pub fn resolve_mut(&mut self, name: Option<&str>) -> Result<&mut Agent> {
        let key = match name {
            Some(n) if self.agents.contains_key(n) => n.to_string(),
            _ => self.default.clone().ok_or(Error::NoAgentRegistered)?,
        };
        self.agents.get_mut(&key).ok_or(Error::NoAgentRegistered)
    }

    /// Registered agent names, sorted for stable output.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.agents.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<&Agent> {
        self.agents.get(name)
    }

    /// Build the registry from static configuration.
    ///
    /// Each agent's index is loaded from its data directory when the
    /// document artifact exists; otherwise the agent starts empty (the
    /// corpus has simply not been indexed yet). An existing but corrupt
    /// artifact pair is still a hard error.
    pub fn from_config(config: &Config) -> AnyResult<Self> {
        let mut registry = Self::new();

        for agent_cfg in &config.agents {
            let backend: Box<dyn SearchBackend> = match agent_cfg.backend.as_str() {
                "hnsw" => Box::new(Hnsw::new()),
                _ => Box::new(LinearCosine),
            };
            let mut index = EmbeddingIndex::new(backend);

            if agent_cfg.data_dir.join("documents.json").exists() {
                index.load(&agent_cfg.data_dir)?;
            } else {
                warn!(
                    agent = %agent_cfg.name,
                    dir = %agent_cfg.data_dir.display(),
                    "no indexed data found, starting empty"
                );
            }

            let mut emb_cfg = config.embedding.clone();
            if let Some(model) = &agent_cfg.embedding_model {
                emb_cfg.model = model.clone();
            }
            let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(&emb_cfg)?);

            registry.register(
                Agent {
                    name: agent_cfg.name.clone(),
                    data_dir: agent_cfg.data_dir.clone(),
                    threshold: agent_cfg.threshold,
                    index,
                    embedder,
                },
                agent_cfg.default,
            );
        }

        Ok(registry)
    }
}
