//! Aggregate pipeline status, recomputed on demand or on a schedule.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::EnrichmentStatus;

/// A point-in-time summary of the whole catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRollup {
  /// Every status appears, with zero when no record is in it.
  pub by_status:     BTreeMap<String, u64>,
  /// Keyed by `data_sources` label; unenriched records are not counted.
  pub by_source:     BTreeMap<String, u64>,
  /// Mean of non-null quality scores, `None` when nothing is scored.
  pub avg_quality:   Option<f64>,
  pub suspect_count: u64,
  pub total:         u64,
  pub computed_at:   DateTime<Utc>,
}

impl PipelineRollup {
  /// A rollup with every status present at zero.
  pub fn empty(computed_at: DateTime<Utc>) -> Self {
    use strum::IntoEnumIterator;

    Self {
      by_status: EnrichmentStatus::iter()
        .map(|s| (s.as_str().to_owned(), 0))
        .collect(),
      by_source: BTreeMap::new(),
      avg_quality: None,
      suspect_count: 0,
      total: 0,
      computed_at,
    }
  }

  pub fn count(&self, status: EnrichmentStatus) -> u64 {
    self.by_status.get(status.as_str()).copied().unwrap_or(0)
  }

  /// Records a worker could still pick up.
  pub fn outstanding(&self) -> u64 {
    self.count(EnrichmentStatus::Pending) + self.count(EnrichmentStatus::Processing)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_lists_every_status() {
    let r = PipelineRollup::empty(Utc::now());
    assert_eq!(r.by_status.len(), 5);
    assert_eq!(r.count(EnrichmentStatus::Failed), 0);
    assert_eq!(r.outstanding(), 0);
  }
}
