//! Operator controls for the enrichment pipeline.
//!
//! | Method | Path | Body | Response |
//! |--------|------|------|----------|
//! | `GET`  | `/status` | | last rollup, computed on first use |
//! | `POST` | `/status/refresh` | | fresh rollup |
//! | `POST` | `/enqueue` | selector | `{"enqueued": n}` |
//! | `POST` | `/reprocess` | selector | `{"reset": n}` |
//! | `POST` | `/sweep/quality` | | `{"examined": n, "regressed": [...]}` |
//! | `POST` | `/release-stale` | | `{"released": n}` |
//! | `POST` | `/rerank` | | `{"changed": n}` |
//!
//! Selectors are tagged objects: `{"by": "all"}`, `{"by": "ids", "value":
//! [...]}`, `{"by": "status", "value": "failed"}`, `{"by": "name_like",
//! "value": "%chicken%"}`, `{"by": "data_source", "value": "USDA-Branded"}`.

use axum::{Json, extract::State};
use larder_core::{
  quality::Regression,
  rollup::PipelineRollup,
  store::{FoodSelector, FoodStore},
};
use larder_worker::sweep;
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

// ─── Rollup ───────────────────────────────────────────────────────────────────

/// `GET /status`
pub async fn status<S>(State(state): State<ApiState<S>>) -> Result<Json<PipelineRollup>, ApiError>
where
  S: FoodStore,
{
  let cached = state.store.latest_rollup().await.map_err(ApiError::store)?;
  let rollup = match cached {
    Some(r) => r,
    None => sweep::refresh_rollup(state.store.as_ref()).await?,
  };
  Ok(Json(rollup))
}

/// `POST /status/refresh`
pub async fn refresh<S>(State(state): State<ApiState<S>>) -> Result<Json<PipelineRollup>, ApiError>
where
  S: FoodStore,
{
  Ok(Json(sweep::refresh_rollup(state.store.as_ref()).await?))
}

// ─── Queue ────────────────────────────────────────────────────────────────────

/// `POST /enqueue`
pub async fn enqueue<S>(
  State(state): State<ApiState<S>>,
  Json(selector): Json<FoodSelector>,
) -> Result<Json<Value>, ApiError>
where
  S: FoodStore,
{
  let enqueued = state.store.enqueue(&selector).await.map_err(ApiError::store)?;
  Ok(Json(json!({ "enqueued": enqueued })))
}

/// `POST /release-stale`
pub async fn release_stale<S>(State(state): State<ApiState<S>>) -> Result<Json<Value>, ApiError>
where
  S: FoodStore,
{
  let released = sweep::release_stale(state.store.as_ref(), &state.config).await?;
  Ok(Json(json!({ "released": released })))
}

// ─── Sweeps ───────────────────────────────────────────────────────────────────

/// `POST /reprocess`
pub async fn reprocess<S>(
  State(state): State<ApiState<S>>,
  Json(selector): Json<FoodSelector>,
) -> Result<Json<Value>, ApiError>
where
  S: FoodStore,
{
  let reset = sweep::reprocess(state.store.as_ref(), &selector).await?;
  Ok(Json(json!({ "reset": reset })))
}

#[derive(Debug, Serialize)]
pub struct RegressedFood {
  pub food_id: Uuid,
  pub kind:    Regression,
  pub reason:  &'static str,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
  pub examined:  u64,
  pub regressed: Vec<RegressedFood>,
}

/// `POST /sweep/quality`
pub async fn sweep_quality<S>(State(state): State<ApiState<S>>) -> Result<Json<SweepResponse>, ApiError>
where
  S: FoodStore,
{
  let report = sweep::quality_sweep(state.store.as_ref(), &state.config).await?;
  Ok(Json(SweepResponse {
    examined:  report.examined,
    regressed: report
      .regressed
      .into_iter()
      .map(|(food_id, kind)| RegressedFood { food_id, kind, reason: kind.reason() })
      .collect(),
  }))
}

/// `POST /rerank`
pub async fn rerank<S>(State(state): State<ApiState<S>>) -> Result<Json<Value>, ApiError>
where
  S: FoodStore,
{
  let changed = state.store.rerank().await.map_err(ApiError::store)?;
  Ok(Json(json!({ "changed": changed })))
}
