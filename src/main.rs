//! # Argo Harness CLI (`argo`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `argo init` | Create the SQLite database and schema |
//! | `argo ingest <DIR>` | Ingest every float directory under `DIR` |
//! | `argo index` | Rebuild per-profile index documents |
//! | `argo search "<query>"` | Search index documents |
//! | `argo stats` | Row counts and index coverage |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).

use std::path::PathBuf;

use argo_harness::progress::ProgressMode;
use argo_harness::{config, index, ingest, migrate, search, stats};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

/// Argo Harness CLI: ingest Argo float archives and publish profile
/// documents for retrieval.
#[derive(Parser)]
#[command(
    name = "argo",
    about = "Argo Harness: ingest Argo float NetCDF archives and publish searchable profile documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/argo.toml")]
    config: PathBuf,

    /// Progress on stderr. Defaults to `human` on a TTY, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    /// Log output format on stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema. Safe to run repeatedly.
    Init,

    /// Ingest float archives.
    ///
    /// `DIR` holds one sub-directory per float, named by its integer
    /// platform id, containing `<id>_meta.nc` and `<id>_Sprof.nc` or
    /// `<id>_prof.nc`. Re-ingesting adds no duplicate rows.
    Ingest {
        /// Root directory of the float archives.
        dir: PathBuf,

        /// Maximum number of floats to ingest.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Rebuild index documents from the database.
    Index {
        /// Documents per upsert batch (1..=512); overrides `index.batch_size`.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Compose documents and report counts without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search index documents.
    Search {
        query: String,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show row counts and index coverage.
    Stats,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.with_target(false).init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let cfg = config::load_config(&cli.config)?;
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { dir, limit } => {
            ingest::run_ingest(&cfg, &dir, limit, progress).await?;
        }
        Commands::Index {
            batch_size,
            dry_run,
        } => {
            index::run_index(&cfg, batch_size, dry_run, progress).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
