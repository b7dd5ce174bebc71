//! `hindsight`: inspect and maintain a hindsight memory store.
//!
//! Reads `hindsight.toml` (or the path given with `--config`); any key can be
//! overridden with `HINDSIGHT__<KEY>` environment variables, e.g.
//! `HINDSIGHT__STORE_PATH` or `HINDSIGHT__RETENTION__EXCHANGE_DAYS`.
//!
//! ```
//! hindsight search "jazz" --source exchanges --limit 5
//! hindsight export ~/hindsight-backup.json
//! hindsight prune
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use hindsight::{
  Hindsight, MemoryConfig,
  core::{Table, search::SearchQuery},
  learn::FeedbackClassifier,
};
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Hindsight memory maintenance")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "hindsight.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Full-text search over remembered content.
  Search {
    query:  String,
    /// Only return hits from this table (e.g. `exchanges`, `facts`).
    #[arg(long)]
    source: Option<String>,
    #[arg(long, default_value_t = 10)]
    limit:  usize,
  },
  /// Write every table to a JSON file.
  Export { path: PathBuf },
  /// Import an export file or a legacy memory file.
  Import { path: PathBuf },
  /// Apply the configured retention windows.
  Prune,
  /// Row counts per table.
  Stats,
  /// Rebuild the full-text index from the primary tables.
  Reindex,
  /// Classify an utterance as feedback without storing anything.
  Classify { text: String },
  /// Learned corrections for a tool.
  Corrections {
    #[arg(long)]
    tool:   String,
    #[arg(long)]
    action: Option<String>,
  },
  /// Usage and failure history for a tool.
  Insights {
    tool:   String,
    #[arg(long)]
    action: Option<String>,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Logs go to stderr so command output stays machine-readable.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  if let Command::Classify { text } = &cli.command {
    return print(&FeedbackClassifier::new().classify(text));
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("HINDSIGHT").separator("__"))
    .build()
    .context("failed to read config file")?;

  let mut memory_cfg: MemoryConfig = settings
    .try_deserialize()
    .context("failed to deserialise MemoryConfig")?;
  memory_cfg.store_path = expand_tilde(&memory_cfg.store_path);
  memory_cfg.snapshot_path = expand_tilde(&memory_cfg.snapshot_path);
  // One-shot commands have no use for a background rebuild.
  memory_cfg.background_index_rebuild = false;

  let memory = Hindsight::open(memory_cfg).await;
  if memory.is_degraded() {
    tracing::warn!("store unavailable; only cached memory is readable");
  }

  let outcome = run(&memory, cli.command).await;
  memory.close().await.context("failed to close store")?;
  outcome
}

async fn run(memory: &Hindsight, command: Command) -> anyhow::Result<()> {
  match command {
    Command::Search { query, source, limit } => {
      let mut query = SearchQuery::new(query).limit(limit);
      if let Some(source) = source {
        query = query.source(Table::parse(&source)?);
      }
      print(&memory.search_memory(query).await)
    }
    Command::Export { path } => {
      let path = expand_tilde(&path);
      memory
        .export_json(&path)
        .await
        .with_context(|| format!("failed to export to {}", path.display()))?;
      eprintln!("exported to {}", path.display());
      Ok(())
    }
    Command::Import { path } => {
      let path = expand_tilde(&path);
      let report = memory
        .import_legacy_json(&path)
        .await
        .with_context(|| format!("failed to import {}", path.display()))?;
      print(&report)
    }
    Command::Prune => print(&memory.prune().await?),
    Command::Stats => print(&memory.stats().await?),
    Command::Reindex => {
      let rows = memory.reindex().await?;
      eprintln!("indexed {rows} rows");
      Ok(())
    }
    Command::Classify { text } => print(&memory.classifier().classify(&text)),
    Command::Corrections { tool, action } => {
      print(&memory.corrections_for(&tool, action.as_deref()).await)
    }
    Command::Insights { tool, action } => {
      print(&memory.tool_insights(&tool, action.as_deref()).await?)
    }
  }
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
