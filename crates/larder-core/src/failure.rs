//! Reasons a record could not be enriched.
//!
//! A resolution failure is an expected outcome, not an error: the worker
//! marks the record `failed` with [`ResolutionFailure::reason`] and moves on.
//! The record is retried on a later sweep until its attempts run out.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionFailure {
  /// Nothing to compare the food name against.
  #[error("no candidates")]
  NoCandidates,

  /// The best candidate scored under the acceptance floor.
  #[error("below threshold (best score {best})")]
  BelowThreshold { best: u8 },

  /// A match was accepted but the reference entry had no usable values.
  #[error("merge no-op: reference {reference_id} has no usable nutrient data")]
  MergeNoOp { reference_id: i64 },

  /// External API returned non-2xx, timed out or sent a malformed body.
  #[error("upstream error: {0}")]
  Upstream(String),
}

impl ResolutionFailure {
  /// Stable short label for rollups and log fields.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::NoCandidates => "no_candidates",
      Self::BelowThreshold { .. } => "below_threshold",
      Self::MergeNoOp { .. } => "merge_no_op",
      Self::Upstream(_) => "upstream_error",
    }
  }

  /// Human-readable text stored in `FoodRecord::failure_reason`.
  pub fn reason(&self) -> String { self.to_string() }
}
