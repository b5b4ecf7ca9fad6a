//! # campus-qa CLI (`cqa`)
//!
//! The `cqa` binary is the operational interface for campus-qa. It
//! covers offline indexing, search and question answering against the
//! indexed corpus, and index inspection.
//!
//! ## Usage
//!
//! ```bash
//! cqa --config ./config/cqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cqa agents` | List configured agents and the default |
//! | `cqa stats` | Show document and embedding counts per agent |
//! | `cqa index <docs.json>` | Embed and index a batch of raw documents |
//! | `cqa search "<query>"` | Similarity search over the corpus |
//! | `cqa ask "<question>"` | Answer a question end to end |
//!
//! ## Examples
//!
//! ```bash
//! # Index the crawler output into the default agent
//! cqa index ./data/raw_documents.json
//!
//! # Inspect the result
//! cqa stats
//!
//! # Search without generation
//! cqa search "calendário acadêmico 2024" --k 5
//!
//! # Full question answering
//! cqa ask "qual o prazo do edital de monitoria?"
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use campus_qa::config::load_config;
use campus_qa::embedding::embed_query;
use campus_qa::generation::{HttpGenerator, LlmIntentOracle};
use campus_qa::models::Document;
use campus_qa::pipeline::Pipeline;
use campus_qa::registry::AgentRegistry;
use campus_qa::stats::run_stats;

/// campus-qa CLI: question answering over a university document corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/cqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "cqa",
    about = "campus-qa — question answering over a university's public documents",
    version,
    long_about = "campus-qa indexes crawled university documents as embedding vectors, \
    routes incoming questions to the right retrieval path, and assembles bounded, \
    source-cited context for a completion service."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// List configured agents and mark the default.
    Agents,

    /// Show document and embedding counts per agent.
    Stats {
        /// Restrict output to one agent.
        #[arg(long)]
        agent: Option<String>,
    },

    /// Embed and index a batch of raw documents.
    ///
    /// The input file is a JSON array of `{url, content}` objects, as
    /// produced by the crawler. Documents are embedded in batches,
    /// appended to the agent's index, and the index is saved back to the
    /// agent's data directory. Run this offline; searches should not be
    /// served while an index write is in flight.
    Index {
        /// Path to the raw documents JSON file.
        input: PathBuf,

        /// Target agent (defaults to the registry default).
        #[arg(long)]
        agent: Option<String>,
    },

    /// Similarity search over the corpus, without generation.
    Search {
        /// Search query text.
        query: String,

        /// Agent to search (defaults to the registry default).
        #[arg(long)]
        agent: Option<String>,

        /// Maximum number of hits.
        #[arg(long)]
        k: Option<usize>,

        /// Minimum similarity score.
        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Answer a question end to end.
    Ask {
        /// The question, in natural language.
        question: String,

        /// Agent to answer from (defaults to the registry default).
        #[arg(long)]
        agent: Option<String>,

        /// Minimum similarity score for this request.
        #[arg(long)]
        threshold: Option<f32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let mut registry = AgentRegistry::from_config(&config)?;

    match cli.command {
        Commands::Agents => {
            println!("Configured agents:");
            for name in registry.names() {
                let marker = if registry.default_name() == Some(name) {
                    " (default)"
                } else {
                    ""
                };
                println!("  {name}{marker}");
            }
            Ok(())
        }

        Commands::Stats { agent } => run_stats(&registry, agent.as_deref()),

        Commands::Index { input, agent } => {
            let raw = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read documents file: {}", input.display()))?;
            let documents: Vec<Document> =
                serde_json::from_str(&raw).with_context(|| "Failed to parse documents JSON")?;
            if documents.is_empty() {
                println!("Nothing to index: input file is empty.");
                return Ok(());
            }

            let batch_size = config.embedding.batch_size.max(1);
            let agent = registry.resolve_mut(agent.as_deref())?;
            let total = documents.len();

            for batch in documents.chunks(batch_size) {
                let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();
                let embeddings = agent.embedder.embed(&texts).await?;
                agent.index.add(batch.to_vec(), embeddings)?;
            }
            agent.index.save(&agent.data_dir)?;

            println!(
                "Indexed {} documents into agent '{}' ({} total).",
                total,
                agent.name,
                agent.index.len()
            );
            Ok(())
        }

        Commands::Search {
            query,
            agent,
            k,
            threshold,
        } => {
            let agent = registry.resolve(agent.as_deref())?;
            let k = k.unwrap_or(config.retrieval.k);
            let threshold = threshold
                .or(agent.threshold)
                .unwrap_or(config.retrieval.threshold);

            let query_vec = embed_query(agent.embedder.as_ref(), &query).await?;
            let hits = agent.index.search(&query_vec, k, threshold);

            if hits.is_empty() {
                println!("No results above threshold {threshold}.");
                return Ok(());
            }
            for hit in &hits {
                let preview: String = hit.document.content.chars().take(160).collect();
                println!("{:.4}  {}", hit.score, hit.document.url);
                println!("        {preview}");
            }
            Ok(())
        }

        Commands::Ask {
            question,
            agent,
            threshold,
        } => {
            let generator = Arc::new(HttpGenerator::new(&config.generation)?);
            let oracle = Arc::new(LlmIntentOracle::new(generator.clone()));
            let pipeline = Pipeline::new(generator, oracle, config.retrieval.clone());

            let answer = pipeline
                .ask(&registry, &question, agent.as_deref(), threshold)
                .await?;

            println!("{}", answer.answer);
            if !answer.sources.is_empty() {
                println!();
                println!("Fontes:");
                for source in &answer.sources {
                    println!("  {source}");
                }
            }
            Ok(())
        }
    }
}
