//! # Support RAG CLI (`tix`)
//!
//! The `tix` binary answers support questions from a knowledge base of
//! resolved tickets. It indexes the ticket file, runs semantic search,
//! asks a generative model for an answer, and serves the same operations
//! over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! tix --config ./config/tix.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tix init` | Open the index and populate it if empty |
//! | `tix index` | Re-embed and upsert every ticket |
//! | `tix reset` | Drop every collection in the index |
//! | `tix ask "<question>"` | Answer a question from similar tickets |
//! | `tix search "<query>"` | Show the most similar tickets |
//! | `tix sample` | Print the first tickets of the source file |
//! | `tix stats` | Print index and ticket-file diagnostics |
//! | `tix serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # Build the index from ./data/tickets.json
//! tix init --config ./config/tix.toml
//!
//! # Ask a question (needs GOOGLE_API_KEY)
//! tix ask "I forgot my password" --k 3
//!
//! # Inspect what retrieval finds
//! tix search "vpn disconnects"
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use support_rag::{commands, config, logging, server};

/// Support RAG CLI: answer support questions from historical tickets.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tix.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tix",
    about = "Support RAG: answer support questions from historical tickets",
    version,
    long_about = "Support RAG indexes a JSON file of resolved support tickets into a local \
    vector index, retrieves the tickets most similar to a question, and asks a generative \
    model to answer from their resolutions. Available as a CLI and an HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/tix.toml`.
    #[arg(long, global = true, default_value = "./config/tix.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the index, creating the collection and indexing all tickets if
    /// it is empty.
    ///
    /// Idempotent: a populated index is left as is.
    Init,

    /// Re-embed every ticket and upsert it into the collection.
    ///
    /// Existing records with the same ticket id are overwritten.
    Index,

    /// Drop every collection in the index.
    ///
    /// Refused when `[index] allow_reset = false`.
    Reset,

    /// Answer a question using the most similar tickets as context.
    Ask {
        /// The question to answer.
        query: String,

        /// Number of tickets to retrieve (capped at `retrieval.max_top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Show the tickets most similar to a query, with scores.
    Search {
        /// Search query text.
        query: String,

        /// Number of results (capped at `retrieval.max_top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Print the first `n` valid tickets from the ticket file as JSON.
    Sample {
        #[arg(long, default_value = "5")]
        n: usize,
    },

    /// Print collection and ticket-file statistics as JSON.
    Stats,

    /// Start the HTTP API on `[server] bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging.level)?;

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Index => commands::run_index(&cfg).await?,
        Commands::Reset => commands::run_reset(&cfg).await?,
        Commands::Ask { query, k } => commands::run_ask(&cfg, &query, k).await?,
        Commands::Search { query, k } => commands::run_search(&cfg, &query, k).await?,
        Commands::Sample { n } => commands::run_sample(&cfg, n)?,
        Commands::Stats => commands::run_stats(&cfg).await?,
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}
