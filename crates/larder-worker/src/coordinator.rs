//! Runs a pool of workers and the rollup schedule.

use std::time::Duration;

use larder_core::{rollup::PipelineRollup, store::FoodStore};
use tokio::{
  sync::watch,
  task::JoinSet,
  time::{Instant, MissedTickBehavior},
};
use tracing::{Instrument as _, error, info, info_span, warn};

use crate::{
  error::Result,
  resolver::Resolver,
  sweep,
  worker::{CycleReport, Worker},
};

#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
  /// Keep polling an empty queue instead of stopping.
  pub follow:          bool,
  /// Wait between polls of an empty queue when following.
  pub idle_poll:       Duration,
  pub rollup_interval: Duration,
}

impl Default for PoolOptions {
  fn default() -> Self {
    Self {
      follow:          false,
      idle_poll:       Duration::from_secs(5),
      rollup_interval: Duration::from_secs(60),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolReport {
  pub workers: usize,
  pub totals:  CycleReport,
  /// The rollup refreshed after the last worker stopped.
  pub rollup:  PipelineRollup,
}

/// A receiver that flips to `true` on the first Ctrl-C.
pub fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
  let (tx, rx) = watch::channel(false);
  tokio::spawn(async move {
    match tokio::signal::ctrl_c().await {
      Ok(()) => {
        info!("interrupt received; stopping after the current batch");
        let _ = tx.send(true);
      }
      Err(e) => warn!(error = %e, "cannot listen for Ctrl-C"),
    }
    // Holding the sender keeps receivers from seeing a closed channel.
    tx.closed().await;
  });
  rx
}

/// Spawn every worker, refresh the rollup on `monitor` every
/// `rollup_interval` while they run, and wait for all of them to stop.
///
/// Each worker should own its own store handle. The first worker error is
/// returned after the remaining workers have stopped.
pub async fn run_pool<S, R>(
  workers: Vec<Worker<S, R>>,
  monitor: S,
  options: PoolOptions,
  shutdown: watch::Receiver<bool>,
) -> Result<PoolReport>
where
  S: FoodStore + 'static,
  R: Resolver + 'static,
{
  let count = workers.len();
  let mut set = JoinSet::new();
  for worker in workers {
    let span = info_span!("worker", id = %worker.id());
    let shutdown = shutdown.clone();
    set.spawn(
      async move { worker.run(shutdown, options.follow, options.idle_poll).await }
        .instrument(span),
    );
  }
  info!(workers = count, follow = options.follow, "worker pool started");

  let period = options.rollup_interval.max(Duration::from_secs(1));
  let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

  let mut totals = CycleReport::default();
  let mut first_error = None;
  loop {
    tokio::select! {
      joined = set.join_next() => match joined {
        None => break,
        Some(Ok(Ok(report))) => totals.absorb(&report),
        Some(Ok(Err(e))) => {
          error!(error = %e, "worker stopped with an error");
          first_error.get_or_insert(e);
        }
        Some(Err(e)) => {
          error!(error = %e, "worker task failed");
          first_error.get_or_insert(e.into());
        }
      },
      _ = ticker.tick() => {
        if let Err(e) = sweep::refresh_rollup(&monitor).await {
          warn!(error = %e, "scheduled rollup refresh failed");
        }
      }
    }
  }

  if let Some(e) = first_error {
    return Err(e);
  }
  let rollup = sweep::refresh_rollup(&monitor).await?;
  info!(
    completed = totals.completed,
    failed = totals.failed,
    lost = totals.lost,
    "worker pool finished"
  );
  Ok(PoolReport { workers: count, totals, rollup })
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use larder_core::{
    config::PipelineConfig,
    food::{NewFood, SourceTier},
    reference::{NutrientValue, ReferenceEntry},
    status::EnrichmentStatus,
  };
  use larder_reference::ReferenceIndex;
  use larder_store_sqlite::SqliteStore;

  use super::*;
  use crate::resolver::ReferenceResolver;

  fn resolver() -> ReferenceResolver {
    let mut index = ReferenceIndex::new();
    for (id, name) in [(1, "Apples, raw"), (2, "Bananas, raw"), (3, "Oats")] {
      index.insert(ReferenceEntry {
        reference_id: id,
        description:  name.into(),
        tier:         SourceTier::SrLegacy,
        category:     None,
      });
      for (code, amount) in [(1008, 60.0), (1003, 1.0), (1005, 14.0), (1004, 0.3)] {
        index.add_nutrient(NutrientValue { reference_id: id, code, amount });
      }
    }
    ReferenceResolver::new(Arc::new(index), 70)
  }

  #[tokio::test]
  async fn pool_drains_a_shared_file_without_double_processing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("larder.db");
    let config = PipelineConfig { call_delay_ms: 0, batch_size: 4, ..Default::default() };

    let monitor = SqliteStore::open(&path).await.unwrap();
    let names = ["Apples", "Bananas", "Oats", "Apples raw", "Kumquat", "Bananas raw"];
    for name in names {
      monitor.insert_food(NewFood { enqueue: true, ..NewFood::new(name) }).await.unwrap();
    }

    let resolver = resolver();
    let mut workers = Vec::new();
    for n in 0..3 {
      let store = SqliteStore::open(&path).await.unwrap();
      workers.push(Worker::new(format!("w{n}"), store, resolver.clone(), config.clone()));
    }

    let (_tx, rx) = watch::channel(false);
    let report = run_pool(workers, monitor, PoolOptions::default(), rx).await.unwrap();

    assert_eq!(report.workers, 3);
    assert_eq!(report.totals.completed, 5);
    // "Kumquat" fails once per allowed attempt.
    assert_eq!(report.totals.failed, 3);
    assert_eq!(report.rollup.count(EnrichmentStatus::Completed), 5);
    assert_eq!(report.rollup.count(EnrichmentStatus::Failed), 1);
    assert_eq!(report.rollup.count(EnrichmentStatus::Processing), 0);
  }
}
