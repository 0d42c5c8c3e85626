//! # catalog-index CLI (`cidx`)
//!
//! The `cidx` binary initializes the index database, keeps embeddings in
//! step with the product catalog, and runs searches against it.
//!
//! ## Usage
//!
//! ```bash
//! cidx --config ./config/cidx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cidx init` | Create the index tables |
//! | `cidx index` | Embed new and changed catalog records |
//! | `cidx search "<query>"` | Ranked product search |
//! | `cidx get <id>` | Show what is stored for one record |
//! | `cidx stats` | Embedding coverage and model breakdown |
//! | `cidx ask "<question>"` | Search, then answer with the chat model |
//!
//! Logs go to stderr and are filtered with `RUST_LOG`
//! (default `catalog_index=info,catalog_index_core=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use catalog_index::index_cmd::IndexArgs;
use catalog_index::{ask, config, get, index_cmd, migrate, search, stats};

/// catalog-index CLI: incremental embedding index and product search.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/cidx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "cidx",
    about = "catalog-index: incremental embedding index and similarity search for a product catalog",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cidx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the index database schema.
    ///
    /// Creates the SQLite file and the `embeddings` and `checksums`
    /// tables. Running it again is a no-op.
    Init,

    /// Embed catalog records that are new or have changed.
    ///
    /// Exits non-zero if any batch failed; failed records stay stale and
    /// are retried on the next run.
    Index {
        /// Ignore stored checksums and re-embed every record.
        #[arg(long)]
        full: bool,

        /// Show how many records would be embedded without calling the provider.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of changed records to embed in this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Override the batch size from config (records per provider call).
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Search the index.
    Search {
        /// Free-text query.
        query: String,

        /// Maximum number of results (default: `retrieval.final_limit`).
        #[arg(long)]
        limit: Option<usize>,

        /// Print the raw outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the stored copy and embedding metadata of one record.
    Get {
        /// Catalog record id.
        id: i64,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show index coverage statistics.
    Stats,

    /// Answer a question from the top search results.
    Ask {
        /// The customer's question.
        question: String,

        /// Number of search results given to the model as context.
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("catalog_index=info,catalog_index_core=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Index database initialized successfully.");
        }
        Commands::Index {
            full,
            dry_run,
            limit,
            batch_size,
        } => {
            let args = IndexArgs {
                full,
                dry_run,
                limit,
                batch_size,
            };
            let report = index_cmd::run_index_cmd(&cfg, &args).await?;
            if report.has_failures() {
                std::process::exit(1);
            }
        }
        Commands::Search { query, limit, json } => {
            search::run_search(&cfg, &query, limit, json).await?;
        }
        Commands::Get { id, json } => {
            get::run_get(&cfg, id, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Ask { question, limit } => {
            ask::run_ask(&cfg, &question, limit).await?;
        }
    }

    Ok(())
}
