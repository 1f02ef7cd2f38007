//! Handlers for `/foods` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/foods` | `?status=&suspect_only=&limit=&offset=`, commonness order |
//! | `POST` | `/foods` | Body: a `NewFood` |
//! | `GET`  | `/foods/{id}` | 404 if not found |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use larder_core::{
  food::{FoodRecord, NewFood},
  status::EnrichmentStatus,
  store::{FoodQuery, FoodStore},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

/// Largest page a single list request may ask for.
const MAX_LIMIT: usize = 1000;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub status:       Option<EnrichmentStatus>,
  #[serde(default)]
  pub suspect_only: bool,
  pub limit:        Option<usize>,
  pub offset:       Option<usize>,
}

/// `GET /foods`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<FoodRecord>>, ApiError>
where
  S: FoodStore,
{
  if params.limit.is_some_and(|l| l > MAX_LIMIT) {
    return Err(ApiError::BadRequest(format!("limit must be at most {MAX_LIMIT}")));
  }
  let query = FoodQuery {
    status:       params.status,
    suspect_only: params.suspect_only,
    limit:        params.limit,
    offset:       params.offset,
  };
  let foods = state.store.list_foods(&query).await.map_err(ApiError::store)?;
  Ok(Json(foods))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /foods`
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  Json(body): Json<NewFood>,
) -> Result<impl IntoResponse, ApiError>
where
  S: FoodStore,
{
  if body.name.trim().is_empty() {
    return Err(ApiError::BadRequest("name must not be empty".into()));
  }
  let food = state.store.insert_food(body).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(food)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /foods/{id}`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<FoodRecord>, ApiError>
where
  S: FoodStore,
{
  let food = state
    .store
    .get_food(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("food {id} not found")))?;
  Ok(Json(food))
}
