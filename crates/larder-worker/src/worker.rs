//! One enrichment worker.

use std::time::Duration;

use larder_core::{
  config::PipelineConfig,
  failure::ResolutionFailure,
  food::FoodRecord,
  merge::merge_panel,
  quality,
  store::{Enrichment, FoodStore},
};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  error::{Error, Result},
  resolver::Resolver,
};

/// What happened to one claimed record.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
  Completed { quality_score: u8, suspect: bool },
  Failed(ResolutionFailure),
  /// The claim was taken over before the result could be written.
  Lost,
}

/// Counts from one or more cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
  pub selected:  usize,
  pub claimed:   usize,
  pub completed: usize,
  pub failed:    usize,
  pub lost:      usize,
}

impl CycleReport {
  pub fn absorb(&mut self, other: &Self) {
    self.selected += other.selected;
    self.claimed += other.claimed;
    self.completed += other.completed;
    self.failed += other.failed;
    self.lost += other.lost;
  }
}

/// Claims, resolves, merges, scores and writes records one at a time.
///
/// A worker keeps no state between cycles beyond its id; crash recovery is
/// the store's stale-claim path.
pub struct Worker<S, R> {
  id:       String,
  store:    S,
  resolver: R,
  config:   PipelineConfig,
}

impl<S, R> Worker<S, R>
where
  S: FoodStore,
  R: Resolver,
{
  pub fn new(id: impl Into<String>, store: S, resolver: R, config: PipelineConfig) -> Self {
    Self { id: id.into(), store, resolver, config }
  }

  pub fn id(&self) -> &str { &self.id }

  /// Select a batch of claimable records and process each one.
  pub async fn run_cycle(&self) -> Result<CycleReport> {
    let policy = self.config.claim_policy();
    let ids = self
      .store
      .claimable(self.config.batch_size, policy)
      .await
      .map_err(Error::store)?;

    let mut report = CycleReport { selected: ids.len(), ..Default::default() };
    for id in ids {
      let Some(record) = self.store.claim(id, &self.id, policy).await.map_err(Error::store)? else {
        debug!(food_id = %id, "claim lost to another worker");
        report.lost += 1;
        continue;
      };
      report.claimed += 1;
      match self.process(record).await? {
        Outcome::Completed { .. } => report.completed += 1,
        Outcome::Failed(_) => report.failed += 1,
        Outcome::Lost => report.lost += 1,
      }
    }

    if report.selected > 0 {
      info!(
        selected = report.selected,
        claimed = report.claimed,
        completed = report.completed,
        failed = report.failed,
        lost = report.lost,
        "cycle finished"
      );
    }
    Ok(report)
  }

  /// Resolve, merge, score and write one record this worker has claimed.
  pub async fn process(&self, mut record: FoodRecord) -> Result<Outcome> {
    let id = record.food_id;
    let resolved = self.resolver.resolve(&record).await;
    if self.resolver.is_remote() {
      tokio::time::sleep(self.config.call_delay()).await;
    }
    let resolution = match resolved {
      Ok(r) => r,
      Err(failure) => return self.fail(id, failure).await,
    };

    // External foods carry no reference id; 0 stands in for them.
    let no_op = ResolutionFailure::MergeNoOp {
      reference_id: resolution.source.reference_id.unwrap_or_default(),
    };
    let Some(merged) = merge_panel(&mut record, resolution.source, &resolution.panel) else {
      return self.fail(id, no_op).await;
    };
    // Neither an energy value nor any macro to estimate one from.
    if record.nutrients.calories.is_none() {
      return self.fail(id, no_op).await;
    }

    let report = quality::score(&record, &self.config.scoring);
    if report.suspect {
      warn!(
        food_id = %id,
        name = %record.name,
        calories = record.nutrients.calories,
        expected = report.audit.map(|a| a.expected),
        "calorie audit failed; score capped"
      );
    }

    let enrichment = Enrichment {
      nutrients:     record.nutrients,
      data_sources:  record.data_sources,
      reference_id:  record.reference_id,
      match_score:   Some(resolution.match_score),
      quality_score: report.score,
      suspect:       report.suspect,
    };
    if !self.store.complete(id, &self.id, enrichment).await.map_err(Error::store)? {
      debug!(food_id = %id, "claim lost before completion");
      return Ok(Outcome::Lost);
    }

    debug!(
      food_id = %id,
      score = report.score,
      fields = merged.written.len(),
      changed = merged.changed.len(),
      estimated_calories = merged.calories_estimated,
      "completed"
    );
    Ok(Outcome::Completed { quality_score: report.score, suspect: report.suspect })
  }

  async fn fail(&self, id: Uuid, failure: ResolutionFailure) -> Result<Outcome> {
    let reason = failure.reason();
    if !self.store.fail(id, &self.id, &reason).await.map_err(Error::store)? {
      debug!(food_id = %id, "claim lost before failure was recorded");
      return Ok(Outcome::Lost);
    }
    warn!(food_id = %id, kind = failure.kind(), %reason, "enrichment failed");
    Ok(Outcome::Failed(failure))
  }

  /// Run cycles until the queue is drained or `shutdown` fires.
  ///
  /// With `follow` set, an empty cycle waits `idle_poll` and tries again
  /// instead of returning. Shutdown is only observed between cycles.
  pub async fn run(
    &self,
    mut shutdown: watch::Receiver<bool>,
    follow: bool,
    idle_poll: Duration,
  ) -> Result<CycleReport> {
    let mut total = CycleReport::default();
    while !*shutdown.borrow() {
      let report = self.run_cycle().await?;
      total.absorb(&report);
      if report.selected > 0 {
        continue;
      }
      if !follow {
        break;
      }
      tokio::select! {
        _ = tokio::time::sleep(idle_poll) => {}
        changed = shutdown.changed() => {
          if changed.is_err() {
            break;
          }
        }
      }
    }
    info!(
      completed = total.completed,
      failed = total.failed,
      lost = total.lost,
      "worker stopped"
    );
    Ok(total)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use larder_core::{
    food::{NewFood, Nutrients, SourceTier},
    reference::{NutrientValue, ReferenceEntry},
    status::EnrichmentStatus,
    store::FoodSelector,
  };
  use larder_reference::ReferenceIndex;
  use larder_store_sqlite::SqliteStore;

  use super::*;
  use crate::resolver::ReferenceResolver;

  /// Foundation chicken breast with a reasonably full panel.
  fn chicken_index() -> ReferenceIndex {
    let mut index = ReferenceIndex::new();
    index.insert(ReferenceEntry {
      reference_id: 171077,
      description:  "Chicken, broiler, breast, meat only, raw".into(),
      tier:         SourceTier::Foundation,
      category:     Some("Poultry Products".into()),
    });
    index.insert(ReferenceEntry {
      reference_id: 9,
      description:  "Tea, brewed".into(),
      tier:         SourceTier::SrLegacy,
      category:     None,
    });
    let rows = [
      (1008, 120.0),
      (1003, 22.5),
      (1005, 0.0),
      (1004, 2.62),
      (1093, 45.0),
      (1092, 334.0),
      (1087, 5.0),
      (1089, 0.37),
      (1090, 28.0),
      (1091, 213.0),
      (1095, 0.68),
      (1175, 0.81),
      (1178, 0.21),
      (1177, 4.0),
    ];
    for (code, amount) in rows {
      index.add_nutrient(NutrientValue { reference_id: 171077, code, amount });
    }
    index
  }

  fn config() -> PipelineConfig {
    PipelineConfig { call_delay_ms: 0, ..Default::default() }
  }

  async fn worker() -> Worker<SqliteStore, ReferenceResolver> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let resolver = ReferenceResolver::new(Arc::new(chicken_index()), 70);
    Worker::new("w1", store, resolver, config())
  }

  async fn queued(w: &Worker<SqliteStore, ReferenceResolver>, name: &str) -> Uuid {
    let food = w.store.insert_food(NewFood { enqueue: true, ..NewFood::new(name) }).await.unwrap();
    assert_eq!(food.status, EnrichmentStatus::Pending);
    food.food_id
  }

  #[tokio::test]
  async fn chicken_breast_is_enriched_end_to_end() {
    let w = worker().await;
    let id = queued(&w, "Chicken Breast").await;

    let report = w.run_cycle().await.unwrap();
    assert_eq!(report, CycleReport { selected: 1, claimed: 1, completed: 1, ..Default::default() });

    let food = w.store.get_food(id).await.unwrap().unwrap();
    assert_eq!(food.status, EnrichmentStatus::Completed);
    assert!(food.quality_score.unwrap() >= 70, "{:?}", food.quality_score);
    assert_eq!(food.data_sources.as_deref(), Some("USDA-Foundation"));
    assert_eq!(food.reference_id, Some(171077));
    assert_eq!(food.match_score, Some(90));
    assert_eq!(food.nutrients.calories, Some(120.0));
    assert_eq!(food.nutrients.carbs_g, None);
    assert!(!food.suspect);
    assert_eq!(food.attempt_count, 1);
    assert!(food.claimed_by.is_none());
    assert!(food.last_enrichment.is_some());
  }

  #[tokio::test]
  async fn unmatched_names_fail_with_a_reason() {
    let w = worker().await;
    let id = queued(&w, "Dragon fruit").await;

    let report = w.run_cycle().await.unwrap();
    assert_eq!(report.failed, 1);
    let food = w.store.get_food(id).await.unwrap().unwrap();
    assert_eq!(food.status, EnrichmentStatus::Failed);
    assert_eq!(food.failure_reason.as_deref(), Some("no candidates"));
  }

  #[tokio::test]
  async fn matched_entry_without_nutrients_is_a_merge_no_op() {
    let w = worker().await;
    let id = queued(&w, "Tea brewed").await;

    w.run_cycle().await.unwrap();
    let food = w.store.get_food(id).await.unwrap().unwrap();
    assert_eq!(food.status, EnrichmentStatus::Failed);
    assert_eq!(
      food.failure_reason,
      Some(ResolutionFailure::MergeNoOp { reference_id: 9 }.reason())
    );
  }

  #[tokio::test]
  async fn failures_stop_after_max_attempts() {
    let w = worker().await;
    let id = queued(&w, "Dragon fruit").await;

    let total = w.run(watch::channel(false).1, false, Duration::ZERO).await.unwrap();
    assert_eq!(total.failed, 3);
    let food = w.store.get_food(id).await.unwrap().unwrap();
    assert_eq!(food.attempt_count, 3);
    assert_eq!(food.status, EnrichmentStatus::Failed);
  }

  #[tokio::test]
  async fn existing_values_survive_enrichment() {
    let w = worker().await;
    let mut input = NewFood { enqueue: true, ..NewFood::new("Chicken Breast") };
    input.nutrients = Nutrients { vitamin_c_mg: Some(1.2), ..Default::default() };
    let id = w.store.insert_food(input).await.unwrap().food_id;

    w.run_cycle().await.unwrap();
    let food = w.store.get_food(id).await.unwrap().unwrap();
    assert_eq!(food.nutrients.vitamin_c_mg, Some(1.2));
    assert_eq!(food.nutrients.protein_g, Some(22.5));
  }

  #[tokio::test]
  async fn reprocessed_records_are_enriched_again() {
    let w = worker().await;
    let id = queued(&w, "Chicken Breast").await;
    w.run_cycle().await.unwrap();

    assert_eq!(w.store.reprocess(&FoodSelector::Ids(vec![id])).await.unwrap(), 1);
    let cleared = w.store.get_food(id).await.unwrap().unwrap();
    assert_eq!(cleared.status, EnrichmentStatus::Pending);
    assert_eq!(cleared.nutrients, Nutrients::default());

    w.run_cycle().await.unwrap();
    let food = w.store.get_food(id).await.unwrap().unwrap();
    assert_eq!(food.status, EnrichmentStatus::Completed);
    assert_eq!(food.nutrients.calories, Some(120.0));
  }

  #[tokio::test]
  async fn shutdown_before_start_processes_nothing() {
    let w = worker().await;
    queued(&w, "Chicken Breast").await;
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let total = w.run(rx, true, Duration::from_secs(60)).await.unwrap();
    assert_eq!(total, CycleReport::default());
  }
}
