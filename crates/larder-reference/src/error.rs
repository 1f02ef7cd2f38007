//! Error types for the reference loader.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("i/o error reading {}: {source}", path.display())]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("read error: {0}")]
  Read(#[from] std::io::Error),

  #[error("{table}: empty input, expected a header row")]
  MissingHeader { table: &'static str },

  #[error("{table}: header has no {column:?} column")]
  MissingColumn {
    table:  &'static str,
    column: &'static str,
  },

  #[error("unterminated quoted field")]
  UnterminatedQuote,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
