//! The enrichment status machine.
//!
//! Every status change a store performs must be one of the transitions
//! accepted by [`EnrichmentStatus::can_transition`]. Storage backends encode
//! the same guards in their conditional updates; this module is where the
//! legal edges are written down once.
//!
//! ```text
//!   unset ──enqueue──▶ pending ──claim──▶ processing ──▶ completed
//!                        ▲  ▲                 │    │          │
//!                        │  └──── claim ──── failed ◀┘          │
//!                        └────── reprocess / quality sweep ─────┘
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::EnumIter;

use crate::{Error, Result};

/// Per-record enrichment lifecycle.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
  EnumIter,
)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentStatus {
  /// Imported but not yet queued.
  #[default]
  Unset,
  Pending,
  Processing,
  Completed,
  Failed,
}

/// Why a transition is being requested. Guards differ per cause, so callers
/// name the cause instead of only the target state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
  /// `unset → pending`.
  Enqueue,
  /// `pending | failed → processing` (and stale `processing → processing`).
  Claim,
  /// `processing → completed`.
  Complete,
  /// `processing → failed`.
  Fail,
  /// Operator reset: `completed | failed | unset → pending`.
  Reprocess,
  /// Scorer regression: `completed → pending`.
  Regress,
  /// Stale claim release: `processing → pending`.
  Release,
}

impl EnrichmentStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Unset => "unset",
      Self::Pending => "pending",
      Self::Processing => "processing",
      Self::Completed => "completed",
      Self::Failed => "failed",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "unset" => Ok(Self::Unset),
      "pending" => Ok(Self::Pending),
      "processing" => Ok(Self::Processing),
      "completed" => Ok(Self::Completed),
      "failed" => Ok(Self::Failed),
      other => Err(Error::UnknownStatus(other.to_owned())),
    }
  }

  /// States from which a worker may claim a record.
  pub const CLAIMABLE: [Self; 2] = [Self::Pending, Self::Failed];

  /// The states a transition may start from.
  pub fn sources(transition: Transition) -> &'static [Self] {
    match transition {
      Transition::Enqueue => &[Self::Unset],
      Transition::Claim => &Self::CLAIMABLE,
      Transition::Complete | Transition::Fail | Transition::Release => {
        &[Self::Processing]
      }
      Transition::Reprocess => {
        &[Self::Unset, Self::Pending, Self::Completed, Self::Failed]
      }
      Transition::Regress => &[Self::Completed],
    }
  }

  /// The state a transition ends in.
  pub fn target(transition: Transition) -> Self {
    match transition {
      Transition::Claim => Self::Processing,
      Transition::Complete => Self::Completed,
      Transition::Fail => Self::Failed,
      Transition::Enqueue
      | Transition::Reprocess
      | Transition::Regress
      | Transition::Release => Self::Pending,
    }
  }

  /// Whether `transition` may be applied to a record currently in `self`.
  pub fn can_transition(self, transition: Transition) -> bool {
    Self::sources(transition).contains(&self)
  }

  /// Apply `transition`, or report the illegal edge.
  pub fn transition(self, transition: Transition) -> Result<Self> {
    let to = Self::target(transition);
    if self.can_transition(transition) {
      Ok(to)
    } else {
      Err(Error::IllegalTransition { from: self, to })
    }
  }
}

impl fmt::Display for EnrichmentStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
