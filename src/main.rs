//! # Answerbase CLI (`abx`)
//!
//! The `abx` binary drives the knowledge-base index: database
//! initialization, one-shot ingestion, hybrid retrieval, the periodic
//! background refresh service, and index statistics.
//!
//! ## Usage
//!
//! ```bash
//! abx --config ./config/answerbase.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `abx init` | Create the SQLite database and schema |
//! | `abx sync` | Run one ingestion cycle and exit |
//! | `abx search "<query>"` | Retrieve context documents for a query |
//! | `abx run` | Start the periodic refresh service |
//! | `abx stats` | Show index statistics |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use answerbase::config::{self, Config};
use answerbase::connector::ConnectorRegistry;
use answerbase::db;
use answerbase::embedding::RemoteEmbedder;
use answerbase::ingest::{self, IngestionPipeline};
use answerbase::keyword::KeywordIndex;
use answerbase::retriever::HybridRetriever;
use answerbase::stats;
use answerbase::store::IndexStore;

/// Answerbase CLI — a hybrid retrieval engine for a customer-support
/// knowledge base.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "abx",
    about = "Answerbase — hybrid retrieval over a customer-support knowledge base",
    version,
    long_about = "Answerbase ingests support documents from connectors, chunks and embeds \
    them, and serves hybrid (vector + keyword) retrieval over an atomically refreshed \
    in-memory index backed by SQLite."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/answerbase.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the parents/children tables.
    /// This command is idempotent — running it multiple times is safe.
    Init,

    /// Run one ingestion cycle and exit.
    ///
    /// Fetches every configured connector, chunks and embeds the
    /// documents, and installs the new generation.
    Sync,

    /// Retrieve context documents for a query.
    ///
    /// Runs hybrid retrieval (vector + keyword) against the persisted
    /// generation and prints the matching parent documents, best first.
    Search {
        /// The query string.
        query: String,

        /// Number of results requested; at most twice this many are
        /// returned. Defaults to the configured `retrieval.top_k`.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Start the periodic refresh service.
    ///
    /// Runs the first ingestion cycle after a short startup delay, then
    /// refreshes on the configured interval until interrupted.
    Run,

    /// Show index statistics.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            IndexStore::open(pool).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Sync => {
            let pipeline = build_pipeline(&cfg).await?;
            let report = pipeline.run_cycle().await?;
            println!(
                "Indexed {} parents / {} children ({} documents skipped, {} batches failed)",
                report.parents, report.children, report.skipped, report.failed_batches
            );
        }
        Commands::Search { query, top_k } => {
            let pool = db::connect(&cfg.db.path).await?;
            let store = Arc::new(IndexStore::open(pool).await?);
            let keyword = Arc::new(KeywordIndex::new(cfg.keyword.enabled));
            let embedder = Arc::new(RemoteEmbedder::new(&cfg.embedding)?);
            let retriever =
                HybridRetriever::new(embedder, store, keyword, cfg.retrieval.clone());

            let k = top_k.unwrap_or(cfg.retrieval.top_k);
            let results = retriever.retrieve(&query, k).await;
            if results.is_empty() {
                println!("No matching documents.");
            }
            for (i, text) in results.iter().enumerate() {
                println!("--- [{}] ---", i + 1);
                println!("{}", text);
                println!();
            }
        }
        Commands::Run => {
            let pipeline = Arc::new(build_pipeline(&cfg).await?);
            let handle = ingest::spawn(pipeline);
            tracing::info!("answerbase running; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            handle.shutdown();
            handle.wait().await;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}

/// Assemble the ingestion pipeline from configuration.
async fn build_pipeline(cfg: &Config) -> Result<IngestionPipeline> {
    let registry = ConnectorRegistry::from_config(cfg);
    if registry.is_empty() {
        anyhow::bail!("no connectors configured; add a [connectors.filesystem] section");
    }

    let pool = db::connect(&cfg.db.path).await?;
    let store = Arc::new(IndexStore::open(pool).await?);
    let keyword = Arc::new(KeywordIndex::new(cfg.keyword.enabled));
    let embedder = Arc::new(RemoteEmbedder::new(&cfg.embedding)?);

    Ok(IngestionPipeline::new(
        registry.connectors().to_vec(),
        embedder,
        store,
        keyword,
        cfg.chunking.clone(),
        cfg.ingestion.clone(),
    ))
}
