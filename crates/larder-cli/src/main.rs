//! `larder`: command-line entry point for the food enrichment pipeline.
//!
//! # Usage
//!
//! ```text
//! larder import foods.jsonl --enqueue
//! larder work --workers 4 --reference-dir ~/data/fdc
//! larder sweep
//! larder reprocess --data-source USDA-Branded
//! larder status --refresh
//! larder serve
//! ```
//!
//! Every command reads `larder.toml` (or `--config FILE`) layered with
//! `LARDER_*` environment variables.

mod commands;
mod settings;

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use larder_core::{status::EnrichmentStatus, store::FoodSelector};
use settings::Settings;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "larder", version, about = "Food enrichment and matching pipeline")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, value_name = "FILE", default_value = "larder.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Import food records from a JSON-lines file (`-` for stdin).
  Import {
    file:    PathBuf,
    /// Queue every imported record for enrichment.
    #[arg(long)]
    enqueue: bool,
  },
  /// Move selected unqueued records to pending.
  Enqueue(SelectorArgs),
  /// Score one name against the reference dataset and print the best match.
  Match {
    name:          String,
    #[arg(long, value_name = "DIR")]
    reference_dir: Option<PathBuf>,
  },
  /// Run enrichment workers until the queue is drained.
  Work(WorkArgs),
  /// Rescore completed records and regress those under the threshold.
  Sweep,
  /// Reset selected records to pending with their enrichment cleared.
  Reprocess(SelectorArgs),
  /// Return claims older than the claim timeout to the queue.
  ReleaseStale,
  /// Recompute every commonness score.
  Rerank,
  /// Print the pipeline rollup.
  Status {
    /// Recompute instead of printing the last stored rollup.
    #[arg(long)]
    refresh: bool,
  },
  /// Serve the JSON API under `/api`.
  Serve,
}

#[derive(Args, Debug)]
pub struct WorkArgs {
  /// Worker tasks in this process, each with its own store connection.
  #[arg(short, long, default_value_t = 1)]
  pub workers:       usize,
  #[arg(long, value_name = "DIR")]
  pub reference_dir: Option<PathBuf>,
  /// Resolve through the external API from the `[api]` table instead.
  #[arg(long, conflicts_with = "reference_dir")]
  pub api:           bool,
  /// Keep polling for work instead of exiting on an empty queue.
  #[arg(long)]
  pub follow:        bool,
  /// Seconds between polls of an empty queue with `--follow`.
  #[arg(long, default_value_t = 5)]
  pub poll_secs:     u64,
}

/// Which records a command applies to. Exactly one must be given.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct SelectorArgs {
  #[arg(long)]
  all:         bool,
  /// Record id; repeat for several.
  #[arg(long = "id", value_name = "UUID")]
  ids:         Vec<Uuid>,
  /// unset, pending, processing, completed or failed.
  #[arg(long)]
  status:      Option<String>,
  /// SQL LIKE pattern on the name, e.g. `%chicken%`.
  #[arg(long, value_name = "PATTERN")]
  name_like:   Option<String>,
  /// Exact source label, e.g. `USDA-Branded`.
  #[arg(long, value_name = "LABEL")]
  data_source: Option<String>,
}

impl SelectorArgs {
  fn into_selector(self) -> Result<FoodSelector> {
    if self.all {
      return Ok(FoodSelector::All);
    }
    if !self.ids.is_empty() {
      return Ok(FoodSelector::Ids(self.ids));
    }
    if let Some(status) = self.status {
      return Ok(FoodSelector::Status(EnrichmentStatus::parse(&status)?));
    }
    if let Some(pattern) = self.name_like {
      return Ok(FoodSelector::NameLike(pattern));
    }
    if let Some(label) = self.data_source {
      return Ok(FoodSelector::DataSource(label));
    }
    bail!("no selector given; use --all, --id, --status, --name-like or --data-source")
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  match cli.command {
    Command::Import { file, enqueue } => commands::import(&settings, &file, enqueue).await,
    Command::Enqueue(sel) => commands::enqueue(&settings, sel.into_selector()?).await,
    Command::Match { name, reference_dir } => commands::match_name(&settings, &name, reference_dir).await,
    Command::Work(args) => commands::work(&settings, args).await,
    Command::Sweep => commands::quality_sweep(&settings).await,
    Command::Reprocess(sel) => commands::reprocess(&settings, sel.into_selector()?).await,
    Command::ReleaseStale => commands::release_stale(&settings).await,
    Command::Rerank => commands::rerank(&settings).await,
    Command::Status { refresh } => commands::status(&settings, refresh).await,
    Command::Serve => commands::serve(&settings).await,
  }
}
