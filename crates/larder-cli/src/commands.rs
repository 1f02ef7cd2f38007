//! Subcommand implementations.

use std::{
  io::{BufRead, BufReader},
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::{Context as _, Result, bail};
use axum::Router;
use larder_core::{
  commonness,
  food::NewFood,
  matcher::{self, ConfidenceBand},
  store::{FoodSelector, FoodStore},
};
use larder_reference::ReferenceIndex;
use larder_store_sqlite::SqliteStore;
use larder_worker::{
  ApiResolver, Backend, PoolOptions, ReferenceResolver, Worker, run_pool, shutdown_on_ctrl_c,
  sweep,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{WorkArgs, settings::Settings};

async fn open_store(settings: &Settings) -> Result<SqliteStore> {
  let path = &settings.store_path;
  SqliteStore::open(path)
    .await
    .with_context(|| format!("failed to open store at {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// Load the reference export off the async runtime.
async fn load_reference(dir: PathBuf) -> Result<ReferenceIndex> {
  let shown = dir.display().to_string();
  tokio::task::spawn_blocking(move || larder_reference::load_dir(dir))
    .await
    .context("reference loader task failed")?
    .with_context(|| format!("failed to load reference data from {shown}"))
}

fn reference_dir(settings: &Settings, flag: Option<PathBuf>) -> Result<PathBuf> {
  flag
    .or_else(|| settings.reference_dir.clone())
    .context("no reference data; pass --reference-dir or set reference_dir")
}

// ─── Records ──────────────────────────────────────────────────────────────────

pub async fn import(settings: &Settings, file: &Path, enqueue: bool) -> Result<()> {
  let reader: Box<dyn BufRead> = if file == Path::new("-") {
    Box::new(BufReader::new(std::io::stdin()))
  } else {
    let f = std::fs::File::open(file)
      .with_context(|| format!("failed to open {}", file.display()))?;
    Box::new(BufReader::new(f))
  };

  let store = open_store(settings).await?;
  let mut imported = 0u64;
  for (n, line) in reader.lines().enumerate() {
    let line = line.context("failed to read import file")?;
    if line.trim().is_empty() {
      continue;
    }
    let mut food: NewFood = serde_json::from_str(&line)
      .with_context(|| format!("line {}: not a food record", n + 1))?;
    if food.name.trim().is_empty() {
      bail!("line {}: name must not be empty", n + 1);
    }
    food.enqueue |= enqueue;
    store.insert_food(food).await?;
    imported += 1;
  }

  info!(imported, enqueue, "import finished");
  println!("imported {imported} records");
  Ok(())
}

pub async fn enqueue(settings: &Settings, selector: FoodSelector) -> Result<()> {
  let store = open_store(settings).await?;
  let moved = store.enqueue(&selector).await?;
  println!("enqueued {moved} records");
  Ok(())
}

// ─── Matching ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct MatchReport<'a> {
  name:         &'a str,
  reference_id: Option<i64>,
  description:  Option<&'a str>,
  tier:         Option<&'static str>,
  score:        u8,
  band:         &'static str,
  commonness:   u8,
}

pub async fn match_name(settings: &Settings, name: &str, dir: Option<PathBuf>) -> Result<()> {
  let index = load_reference(reference_dir(settings, dir)?).await?;
  let candidates = index.candidates(name);
  let best = matcher::best_candidate(name, &candidates);

  let score = best.map_or(0, |(_, s)| s);
  let accepted = score >= settings.pipeline.match_floor;
  let band = ConfidenceBand::from_score(score)
    .filter(|_| accepted)
    .map_or("rejected", ConfidenceBand::as_str);
  let entry = best.and_then(|(c, _)| index.entry(c.reference_id));

  print_json(&MatchReport {
    name,
    reference_id: entry.map(|e| e.reference_id),
    description: entry.map(|e| e.description.as_str()),
    tier: entry.map(|e| e.tier.label()),
    score,
    band,
    commonness: commonness::rank(name, entry.and_then(|e| e.category.as_deref())),
  })
}

// ─── Workers ──────────────────────────────────────────────────────────────────

pub async fn work(settings: &Settings, args: WorkArgs) -> Result<()> {
  if args.workers == 0 {
    bail!("--workers must be at least 1");
  }
  let floor = settings.pipeline.match_floor;
  let backend = if args.api {
    let api = settings
      .api
      .clone()
      .context("--api needs an [api] table with a base_url")?;
    Backend::Api(ApiResolver::new(api, floor)?)
  } else {
    let index = load_reference(reference_dir(settings, args.reference_dir)?).await?;
    Backend::Reference(ReferenceResolver::new(Arc::new(index), floor))
  };

  let pid = std::process::id();
  let mut workers = Vec::with_capacity(args.workers);
  for n in 0..args.workers {
    let store = open_store(settings).await?;
    workers.push(Worker::new(
      format!("{pid}-{n}"),
      store,
      backend.clone(),
      settings.pipeline.clone(),
    ));
  }

  let options = PoolOptions {
    follow:          args.follow,
    idle_poll:       Duration::from_secs(args.poll_secs),
    rollup_interval: settings.pipeline.rollup_interval(),
  };
  let report = run_pool(workers, open_store(settings).await?, options, shutdown_on_ctrl_c()).await?;

  println!(
    "completed {}, failed {}, lost {}",
    report.totals.completed, report.totals.failed, report.totals.lost
  );
  print_json(&report.rollup)
}

// ─── Operator sweeps ──────────────────────────────────────────────────────────

pub async fn quality_sweep(settings: &Settings) -> Result<()> {
  let store = open_store(settings).await?;
  let report = sweep::quality_sweep(&store, &settings.pipeline).await?;
  println!(
    "examined {}, regressed {}",
    report.examined,
    report.regressed.len()
  );
  for (id, regression) in &report.regressed {
    println!("{id}\t{}", regression.reason());
  }
  Ok(())
}

pub async fn reprocess(settings: &Settings, selector: FoodSelector) -> Result<()> {
  let store = open_store(settings).await?;
  let reset = sweep::reprocess(&store, &selector).await?;
  println!("reset {reset} records to pending");
  Ok(())
}

pub async fn release_stale(settings: &Settings) -> Result<()> {
  let store = open_store(settings).await?;
  let released = sweep::release_stale(&store, &settings.pipeline).await?;
  println!("released {released} stale claims");
  Ok(())
}

pub async fn rerank(settings: &Settings) -> Result<()> {
  let store = open_store(settings).await?;
  let changed = store.rerank().await?;
  println!("rescored {changed} records");
  Ok(())
}

pub async fn status(settings: &Settings, refresh: bool) -> Result<()> {
  let store = open_store(settings).await?;
  let cached = if refresh { None } else { store.latest_rollup().await? };
  let rollup = match cached {
    Some(r) => r,
    None => sweep::refresh_rollup(&store).await?,
  };
  print_json(&rollup)
}

// ─── Server ───────────────────────────────────────────────────────────────────

pub async fn serve(settings: &Settings) -> Result<()> {
  let store = Arc::new(open_store(settings).await?);
  let app = Router::new()
    .nest("/api", larder_api::api_router(store, settings.pipeline.clone()))
    .layer(TraceLayer::new_for_http());

  let address = settings.address();
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;
  info!("Listening on http://{address}/api");

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
    })
    .await
    .context("server error")?;
  Ok(())
}
