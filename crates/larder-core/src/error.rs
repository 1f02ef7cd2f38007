//! Error types for `larder-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::status::EnrichmentStatus;

#[derive(Debug, Error)]
pub enum Error {
  #[error("food not found: {0}")]
  FoodNotFound(Uuid),

  #[error("illegal status transition {from} -> {to}")]
  IllegalTransition {
    from: EnrichmentStatus,
    to:   EnrichmentStatus,
  },

  #[error("cannot complete food {0}: calories are missing")]
  MissingCalories(Uuid),

  #[error("unknown enrichment status: {0:?}")]
  UnknownStatus(String),

  #[error("unknown source tier: {0:?}")]
  UnknownTier(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
