//! JSON REST API for Larder.
//!
//! Exposes an axum [`Router`] backed by any [`larder_core::store::FoodStore`]:
//! record lookup plus the operator controls (enqueue, reprocess, quality
//! sweep, stale-claim release, rerank, rollup). Auth, TLS, and transport
//! concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", larder_api::api_router(store.clone(), config))
//! ```

pub mod error;
pub mod foods;
pub mod pipeline;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use larder_core::{config::PipelineConfig, store::FoodStore};

pub use error::ApiError;

/// Shared handler state: the store plus the parameters sweeps read.
pub struct ApiState<S> {
  pub store:  Arc<S>,
  pub config: Arc<PipelineConfig>,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      store:  Arc::clone(&self.store),
      config: Arc::clone(&self.config),
    }
  }
}

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>, config: PipelineConfig) -> Router<()>
where
  S: FoodStore + 'static,
{
  let state = ApiState { store, config: Arc::new(config) };
  Router::new()
    // Records
    .route("/foods", get(foods::list::<S>).post(foods::create::<S>))
    .route("/foods/{id}", get(foods::get_one::<S>))
    // Queue
    .route("/enqueue", post(pipeline::enqueue::<S>))
    .route("/release-stale", post(pipeline::release_stale::<S>))
    // Sweeps
    .route("/reprocess", post(pipeline::reprocess::<S>))
    .route("/sweep/quality", post(pipeline::sweep_quality::<S>))
    .route("/rerank", post(pipeline::rerank::<S>))
    // Rollup
    .route("/status", get(pipeline::status::<S>))
    .route("/status/refresh", post(pipeline::refresh::<S>))
    .with_state(state)
}
