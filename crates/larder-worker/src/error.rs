//! Error type for the worker crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("failed to build HTTP client: {0}")]
  HttpClient(#[from] reqwest::Error),

  #[error("worker task panicked or was cancelled: {0}")]
  Join(#[from] tokio::task::JoinError),
}

impl Error {
  pub(crate) fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
