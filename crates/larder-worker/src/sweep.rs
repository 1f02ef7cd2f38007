//! Operator maintenance passes, logged the way workers log.

use larder_core::{
  config::PipelineConfig,
  rollup::PipelineRollup,
  store::{FoodSelector, FoodStore, SweepReport},
};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Rescore completed records and send those under the threshold back to
/// the queue. Safe to re-run; a second pass over unchanged data regresses
/// nothing new.
pub async fn quality_sweep<S: FoodStore>(store: &S, config: &PipelineConfig) -> Result<SweepReport> {
  let report = store
    .quality_sweep(&config.scoring, config.quality_threshold)
    .await
    .map_err(Error::store)?;

  for (food_id, regression) in &report.regressed {
    warn!(%food_id, reason = regression.reason(), "regressed to pending");
  }
  info!(
    examined = report.examined,
    regressed = report.regressed.len(),
    threshold = config.quality_threshold,
    "quality sweep finished"
  );
  Ok(report)
}

/// Reset every selected record to `pending` with its enrichment cleared.
pub async fn reprocess<S: FoodStore>(store: &S, selector: &FoodSelector) -> Result<u64> {
  let reset = store.reprocess(selector).await.map_err(Error::store)?;
  info!(?selector, reset, "reprocess sweep finished");
  Ok(reset)
}

/// Return abandoned claims to the queue.
pub async fn release_stale<S: FoodStore>(store: &S, config: &PipelineConfig) -> Result<u64> {
  let released = store
    .release_stale(config.claim_timeout())
    .await
    .map_err(Error::store)?;
  if released > 0 {
    warn!(released, timeout_s = config.claim_timeout_s, "released stale claims");
  }
  Ok(released)
}

/// Recompute and persist the rollup.
pub async fn refresh_rollup<S: FoodStore>(store: &S) -> Result<PipelineRollup> {
  let rollup = store.refresh_rollup().await.map_err(Error::store)?;
  info!(
    total = rollup.total,
    outstanding = rollup.outstanding(),
    suspect = rollup.suspect_count,
    avg_quality = rollup.avg_quality,
    "rollup refreshed"
  );
  Ok(rollup)
}
