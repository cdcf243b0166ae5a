//! # Source Sieve CLI (`sieve`)
//!
//! ## Usage
//!
//! ```bash
//! sieve --config ./config/sieve.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sieve init` | Create the SQLite database and run schema migrations |
//! | `sieve fetch --input <jsonl> --chain-id <hex>` | Download, flatten and store contracts |
//! | `sieve flatten <payload.json> --output <dir>` | Flatten one saved payload |
//! | `sieve match [--rebuild]` | Classify stored contracts as library-only, duplicate or novel |
//! | `sieve hashes --root <dir> --output <file>` | Build a library hash list from a checkout |
//! | `sieve stats` | Ledger and index summary |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use source_sieve::progress::ProgressMode;
use source_sieve::{config, ingest, libraries, matching, migrate, stats};

/// Source Sieve: flatten verified contract sources and sieve out libraries
/// and near-duplicates.
#[derive(Parser)]
#[command(
    name = "sieve",
    about = "Flatten verified smart-contract sources and sieve out libraries and near-duplicates",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sieve.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a terminal, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it several times is safe.
    Init,

    /// Download, flatten and store contracts listed in a JSON-lines file.
    ///
    /// Each line is an object with an `address` field; other fields are
    /// copied to the ledger. Addresses already on disk are skipped.
    Fetch {
        /// JSON-lines file of `{"address": "0x..."}` objects.
        #[arg(long)]
        input: PathBuf,

        /// Hex chain id with a `[chains."<id>"]` entry in the config.
        #[arg(long)]
        chain_id: String,

        /// Maximum number of input lines to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Flatten one saved explorer payload into a directory.
    ///
    /// Does not need a config file.
    Flatten {
        /// JSON file: a `getsourcecode` response or its `result[0]` object.
        payload: PathBuf,

        /// Directory receiving the flat files.
        #[arg(long)]
        output: PathBuf,
    },

    /// Classify stored contracts and record the result in the ledger.
    Match {
        /// Clear the persisted index and reclassify every ledger entry.
        #[arg(long)]
        rebuild: bool,
    },

    /// Build a known-library hash list from a checked-out library tree.
    ///
    /// Does not need a config file.
    Hashes {
        /// Root of the checkout.
        #[arg(long)]
        root: PathBuf,

        /// JSON file to write.
        #[arg(long)]
        output: PathBuf,

        /// Glob of files to hash, relative to the root (repeatable).
        #[arg(long = "include", default_value = libraries::DEFAULT_INCLUDE)]
        include: Vec<String>,

        /// Glob of files to leave out (repeatable).
        #[arg(long = "exclude")]
        exclude: Vec<String>,
    },

    /// Show ledger and index statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let reporter = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    // Commands that don't require config
    match &cli.command {
        Commands::Flatten { payload, output } => {
            ingest::run_flatten(payload, output)?;
            return Ok(());
        }
        Commands::Hashes {
            root,
            output,
            include,
            exclude,
        } => {
            libraries::run_hashes(root, output, include, exclude)?;
            return Ok(());
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Fetch {
            input,
            chain_id,
            limit,
        } => {
            ingest::run_fetch(&cfg, &input, &chain_id, limit, reporter.as_ref()).await?;
        }
        Commands::Match { rebuild } => {
            matching::run_match(&cfg, rebuild, reporter.as_ref()).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Flatten { .. } | Commands::Hashes { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
