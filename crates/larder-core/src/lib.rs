//! Records, matching, merging and scoring for the Larder food enrichment
//! pipeline, plus the [`store::FoodStore`] trait backends implement.
//!
//! Nothing here performs I/O. The SQLite store, the reference loader and the
//! workers all build on these types.

// Native `async fn` in traits; the store trait spells out `Send` itself.
#![allow(async_fn_in_trait)]

pub mod commonness;
pub mod config;
pub mod error;
pub mod failure;
pub mod food;
pub mod matcher;
pub mod merge;
pub mod normalize;
pub mod quality;
pub mod reference;
pub mod rollup;
pub mod status;
pub mod store;

pub use error::{Error, Result};
