//! The `FoodStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `larder-store-sqlite`).
//! Workers, the operator API and the CLI depend on this abstraction, not on
//! any concrete backend.
//!
//! Every status-changing method is a guarded write: it only touches rows
//! whose stored status still admits the transition (see
//! [`crate::status`]). Methods report a lost guard through their return value
//! (`None`, `false`, a zero count) rather than an error, because losing a race
//! to another worker is routine.

use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  food::{FoodRecord, NewFood, Nutrients},
  quality::{Regression, ScoringWeights},
  rollup::PipelineRollup,
  status::EnrichmentStatus,
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Which records an operator command applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum FoodSelector {
  All,
  Ids(Vec<Uuid>),
  Status(EnrichmentStatus),
  /// SQL `LIKE` pattern over the name, e.g. `%chicken%`.
  NameLike(String),
  /// Exact `data_sources` label, e.g. `USDA-Branded`.
  DataSource(String),
}

/// Parameters for [`FoodStore::list_foods`].
#[derive(Debug, Clone, Default)]
pub struct FoodQuery {
  pub status: Option<EnrichmentStatus>,
  /// Only records flagged by the calorie audit.
  pub suspect_only: bool,
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

/// When a record may be claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimPolicy {
  /// Failed records with this many attempts are left alone.
  pub max_attempts:  u32,
  /// A `processing` record older than this is treated as abandoned.
  pub claim_timeout: Duration,
}

impl ClaimPolicy {
  /// Claims made before the returned instant are stale.
  pub fn stale_before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
    let timeout = chrono::Duration::from_std(self.claim_timeout)
      .unwrap_or(chrono::Duration::MAX);
    now.checked_sub_signed(timeout).unwrap_or(DateTime::<Utc>::MIN_UTC)
  }
}

/// The result of a successful enrichment, written by [`FoodStore::complete`].
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
  pub nutrients:     Nutrients,
  pub data_sources:  Option<String>,
  pub reference_id:  Option<i64>,
  pub match_score:   Option<u8>,
  pub quality_score: u8,
  pub suspect:       bool,
}

/// Outcome of [`FoodStore::quality_sweep`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
  /// Completed records rescored.
  pub examined:  u64,
  /// Records sent back to `pending`, with the reason.
  pub regressed: Vec<(Uuid, Regression)>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Larder food store backend.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait FoodStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Records ───────────────────────────────────────────────────────────

  /// Persist a new record. The store assigns the id, timestamps and the
  /// commonness score.
  fn insert_food(
    &self,
    input: NewFood,
  ) -> impl Future<Output = Result<FoodRecord, Self::Error>> + Send + '_;

  /// Retrieve a record by id. Returns `None` if not found.
  fn get_food(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<FoodRecord>, Self::Error>> + Send + '_;

  fn list_foods<'a>(
    &'a self,
    query: &'a FoodQuery,
  ) -> impl Future<Output = Result<Vec<FoodRecord>, Self::Error>> + Send + 'a;

  // ── Queue ─────────────────────────────────────────────────────────────

  /// Move selected `unset` records to `pending`. Returns the number moved.
  fn enqueue<'a>(
    &'a self,
    selector: &'a FoodSelector,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Ids of up to `limit` claimable records, oldest first.
  ///
  /// The list is advisory: another worker may claim any of them before the
  /// caller does.
  fn claimable(
    &self,
    limit: usize,
    policy: ClaimPolicy,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  /// Atomically claim one record for `worker`.
  ///
  /// Returns the claimed record, or `None` when the record was no longer
  /// claimable (another worker won, it completed, or it ran out of attempts).
  fn claim<'a>(
    &'a self,
    id: Uuid,
    worker: &'a str,
    policy: ClaimPolicy,
  ) -> impl Future<Output = Result<Option<FoodRecord>, Self::Error>> + Send + 'a;

  /// `processing → completed`. Returns `false` if `worker` no longer holds
  /// the claim.
  ///
  /// Fails with a core error if the enrichment carries no calories.
  fn complete<'a>(
    &'a self,
    id: Uuid,
    worker: &'a str,
    enrichment: Enrichment,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// `processing → failed` with `reason`. Returns `false` if `worker` no
  /// longer holds the claim.
  fn fail<'a>(
    &'a self,
    id: Uuid,
    worker: &'a str,
    reason: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// `processing → pending` for every claim older than the timeout.
  fn release_stale(
    &self,
    claim_timeout: Duration,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Operator sweeps ───────────────────────────────────────────────────

  /// Reset selected records to `pending`, clearing nutrients, score, source
  /// and match. Records currently `processing` are skipped.
  fn reprocess<'a>(
    &'a self,
    selector: &'a FoodSelector,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Rescore every completed record and regress those under `threshold`.
  fn quality_sweep<'a>(
    &'a self,
    weights: &'a ScoringWeights,
    threshold: u8,
  ) -> impl Future<Output = Result<SweepReport, Self::Error>> + Send + 'a;

  /// Recompute every commonness score. Returns the number that changed.
  fn rerank(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Rollup ────────────────────────────────────────────────────────────

  /// Recompute and persist the pipeline rollup.
  fn refresh_rollup(
    &self,
  ) -> impl Future<Output = Result<PipelineRollup, Self::Error>> + Send + '_;

  /// The last persisted rollup, if one was ever computed.
  fn latest_rollup(
    &self,
  ) -> impl Future<Output = Result<Option<PipelineRollup>, Self::Error>> + Send + '_;
}
