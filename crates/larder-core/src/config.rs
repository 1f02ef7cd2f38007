//! Tunable pipeline parameters.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{matcher::ACCEPT_FLOOR, quality::ScoringWeights, store::ClaimPolicy};

/// Everything a worker, the scorer and the operator sweeps read at runtime.
///
/// Deserialised from the `[pipeline]` table of `larder.toml`; every field has
/// a default so an empty table is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// Records selected per worker cycle.
  pub batch_size:        usize,
  /// Pause after every external call, in milliseconds.
  pub call_delay_ms:     u64,
  /// Age after which a `processing` claim may be taken over, in seconds.
  pub claim_timeout_s:   u64,
  /// Failed records at or above this attempt count are no longer claimed.
  pub max_attempts:      u32,
  /// Completed records scoring below this are regressed by the sweep.
  pub quality_threshold: u8,
  pub match_floor:       u8,
  /// Seconds between scheduled rollup refreshes while workers run.
  pub rollup_interval_s: u64,
  pub scoring:           ScoringWeights,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      batch_size:        50,
      call_delay_ms:     100,
      claim_timeout_s:   600,
      max_attempts:      3,
      quality_threshold: 70,
      match_floor:       ACCEPT_FLOOR,
      rollup_interval_s: 60,
      scoring:           ScoringWeights::default(),
    }
  }
}

impl PipelineConfig {
  pub fn call_delay(&self) -> Duration { Duration::from_millis(self.call_delay_ms) }

  pub fn claim_timeout(&self) -> Duration { Duration::from_secs(self.claim_timeout_s) }

  pub fn claim_policy(&self) -> ClaimPolicy {
    ClaimPolicy {
      max_attempts:  self.max_attempts,
      claim_timeout: self.claim_timeout(),
    }
  }

  pub fn rollup_interval(&self) -> Duration {
    Duration::from_secs(self.rollup_interval_s)
  }

  /// Shorthand for `scoring.calorie_tolerance`.
  pub fn calorie_tolerance(&self) -> f64 { self.scoring.calorie_tolerance }
}
