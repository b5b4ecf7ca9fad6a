//! TOML configuration parsing and validation.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    pub agents: Vec<AgentConfig>,
}

/// Retrieval tuning knobs. Threshold and `k` are independent: the
/// threshold is applied before truncation, so a strict threshold can
/// yield fewer than `k` hits.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            threshold: default_threshold(),
            max_tokens: default_max_tokens(),
            max_chunks: default_max_chunks(),
        }
    }
}

fn default_k() -> usize {
    8
}
fn default_threshold() -> f32 {
    0.4
}
fn default_max_tokens() -> usize {
    700
}
fn default_max_chunks() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_embedding_endpoint(),
            model: default_embedding_model(),
            dims: default_dims(),
            api_key_env: default_embedding_key_env(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_endpoint() -> String {
    "https://api.openai.com/v1/embeddings".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_embedding_key_env() -> String {
    "EMBEDDING_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_generation_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_completion_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_generation_endpoint(),
            model: default_generation_model(),
            api_key_env: default_generation_key_env(),
            temperature: default_temperature(),
            max_tokens: default_completion_tokens(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_generation_endpoint() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}
fn default_generation_model() -> String {
    "llama-3.1-8b-instant".to_string()
}
fn default_generation_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_completion_tokens() -> u32 {
    500
}

/// One tenant: a named index directory plus its backend choice.
#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub data_dir: PathBuf,
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Per-agent embedding model override; falls back to `embedding.model`.
    #[serde(default)]
    pub embedding_model: Option<String>,
    /// Per-agent threshold override; falls back to `retrieval.threshold`.
    #[serde(default)]
    pub threshold: Option<f32>,
    #[serde(default)]
    pub default: bool,
}

fn default_backend() -> String {
    "linear".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.retrieval.k == 0 {
        anyhow::bail!("retrieval.k must be >= 1");
    }
    if config.retrieval.max_tokens == 0 {
        anyhow::bail!("retrieval.max_tokens must be > 0");
    }
    if config.retrieval.max_chunks == 0 {
        anyhow::bail!("retrieval.max_chunks must be >= 1");
    }
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    if config.agents.is_empty() {
        anyhow::bail!("at least one [[agents]] entry is required");
    }
    for agent in &config.agents {
        if agent.name.trim().is_empty() {
            anyhow::bail!("agent name must not be empty");
        }
        match agent.backend.as_str() {
            "linear" | "hnsw" => {}
            other => anyhow::bail!(
                "Unknown backend for agent '{}': '{}'. Must be linear or hnsw.",
                agent.name,
                other
            ),
        }
        if agent.backend == "linear" {
            let threshold = agent.threshold.unwrap_or(config.retrieval.threshold);
            if !(-1.0..=1.0).contains(&threshold) {
                anyhow::bail!(
                    "threshold for cosine agent '{}' must be in [-1.0, 1.0]",
                    agent.name
                );
            }
        }
    }

    Ok(())
}
