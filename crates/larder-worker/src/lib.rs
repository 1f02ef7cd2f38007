//! Enrichment workers and the pool that drives them.
//!
//! A [`Worker`] owns one store handle and one [`Resolver`]. It claims
//! records one at a time, resolves them against reference data (a local
//! [`larder_reference::ReferenceIndex`] or the external enrichment API),
//! merges and scores the result, and writes the terminal state. Workers
//! share nothing in memory; the store's guarded claim is the only
//! coordination between them.

pub mod coordinator;
pub mod error;
pub mod resolver;
pub mod sweep;
pub mod worker;

pub use self::{
  coordinator::{PoolOptions, PoolReport, run_pool, shutdown_on_ctrl_c},
  error::{Error, Result},
  resolver::{ApiResolver, ApiResolverConfig, Backend, ReferenceResolver, Resolution, Resolver},
  worker::{CycleReport, Outcome, Worker},
};
