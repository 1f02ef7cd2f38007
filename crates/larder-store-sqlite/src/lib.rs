//! SQLite backend for the Larder food store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Each [`SqliteStore`] owns one
//! connection; concurrent workers open one store each against the same file
//! and are serialised by SQLite itself (WAL journal plus a busy timeout).

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
