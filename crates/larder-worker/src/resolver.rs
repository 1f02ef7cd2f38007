//! Where candidate nutrient data comes from.
//!
//! | Resolver | Source | Remote |
//! |---|---|---|
//! | [`ReferenceResolver`] | an in-memory [`ReferenceIndex`] | no |
//! | [`ApiResolver`] | `POST {base_url}` on the external enrichment API | yes |
//!
//! Both rank their candidates with the same matcher, so a food name resolves
//! the same way regardless of where the candidates came from.

use std::{future::Future, sync::Arc, time::Duration};

use larder_core::{
  failure::ResolutionFailure,
  food::{FoodRecord, Nutrients, SourceTier},
  matcher::{self, Candidate},
  merge::{MergeSource, extract},
};
use larder_reference::ReferenceIndex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// A resolved candidate, ready to merge.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
  pub source:      MergeSource,
  pub match_score: u8,
  /// Positive values only; see [`extract`].
  pub panel:       Nutrients,
}

/// Finds candidate nutrient data for a claimed record.
pub trait Resolver: Send + Sync {
  /// Whether [`Resolver::resolve`] makes an external call. Workers pause
  /// for the configured call delay after every remote resolution.
  fn is_remote(&self) -> bool;

  fn resolve<'a>(
    &'a self,
    food: &'a FoodRecord,
  ) -> impl Future<Output = Result<Resolution, ResolutionFailure>> + Send + 'a;
}

// ─── Reference data ──────────────────────────────────────────────────────────

/// Resolves against a loaded FoodData Central export.
///
/// The index is read-only after loading; clones share it.
#[derive(Debug, Clone)]
pub struct ReferenceResolver {
  index: Arc<ReferenceIndex>,
  floor: u8,
}

impl ReferenceResolver {
  pub fn new(index: Arc<ReferenceIndex>, floor: u8) -> Self { Self { index, floor } }
}

impl Resolver for ReferenceResolver {
  fn is_remote(&self) -> bool { false }

  async fn resolve(&self, food: &FoodRecord) -> Result<Resolution, ResolutionFailure> {
    let m = self.index.resolve(food.food_id, &food.name, self.floor)?;
    debug!(
      food_id = %food.food_id,
      reference_id = m.reference_id,
      score = m.score,
      band = m.band().as_str(),
      "matched reference entry"
    );
    Ok(Resolution {
      source:      MergeSource { reference_id: Some(m.reference_id), tier: m.tier },
      match_score: m.score,
      panel:       extract(self.index.nutrients(m.reference_id)),
    })
  }
}

// ─── External API ────────────────────────────────────────────────────────────

/// Connection settings for the external enrichment API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResolverConfig {
  pub base_url:    String,
  /// Passed through as the request's `sources` list.
  #[serde(default = "default_sources")]
  pub sources:     Vec<String>,
  #[serde(default = "default_max_results")]
  pub max_results: u32,
  #[serde(default = "default_timeout_s")]
  pub timeout_s:   u64,
}

fn default_sources() -> Vec<String> {
  [SourceTier::Foundation, SourceTier::SrLegacy, SourceTier::Survey]
    .iter()
    .map(|t| t.label().to_owned())
    .collect()
}

fn default_max_results() -> u32 { 10 }

fn default_timeout_s() -> u64 { 30 }

impl ApiResolverConfig {
  pub fn new(base_url: impl Into<String>) -> Self {
    Self {
      base_url:    base_url.into(),
      sources:     default_sources(),
      max_results: default_max_results(),
      timeout_s:   default_timeout_s(),
    }
  }
}

#[derive(Debug, Serialize)]
struct ApiQuery<'a> {
  query:       &'a str,
  sources:     &'a [String],
  max_results: u32,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
  #[serde(default)]
  foods: Vec<ApiFood>,
}

/// One food in an API response. Nutrient keys use the same names as
/// [`Nutrients`]; unknown keys (`quality_score`, …) are ignored.
#[derive(Debug, Deserialize)]
struct ApiFood {
  name:      String,
  #[serde(default)]
  source:    Option<String>,
  #[serde(flatten)]
  nutrients: Nutrients,
}

impl ApiFood {
  /// Tier from the `source` field; unlabelled foods rank as branded.
  fn tier(&self) -> SourceTier {
    self
      .source
      .as_deref()
      .and_then(|s| SourceTier::from_label(s).ok().or_else(|| SourceTier::from_data_type(s)))
      .unwrap_or(SourceTier::Branded)
  }
}

/// Resolves by querying the external enrichment API.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Debug, Clone)]
pub struct ApiResolver {
  client: Client,
  config: ApiResolverConfig,
  floor:  u8,
}

impl ApiResolver {
  pub fn new(config: ApiResolverConfig, floor: u8) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_s))
      .build()?;
    Ok(Self { client, config, floor })
  }

  async fn fetch(&self, query: &str) -> Result<Vec<ApiFood>, ResolutionFailure> {
    let body = ApiQuery {
      query,
      sources: &self.config.sources,
      max_results: self.config.max_results,
    };
    let resp = self
      .client
      .post(&self.config.base_url)
      .json(&body)
      .send()
      .await
      .map_err(|e| ResolutionFailure::Upstream(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
      return Err(ResolutionFailure::Upstream(format!("HTTP {status}")));
    }
    let parsed: ApiResponse = resp
      .json()
      .await
      .map_err(|e| ResolutionFailure::Upstream(format!("malformed response: {e}")))?;
    Ok(parsed.foods)
  }
}

impl Resolver for ApiResolver {
  fn is_remote(&self) -> bool { true }

  async fn resolve(&self, food: &FoodRecord) -> Result<Resolution, ResolutionFailure> {
    let foods = self.fetch(&food.name).await?;

    // Candidate ids are positions in the response.
    let tiers: Vec<SourceTier> = foods.iter().map(ApiFood::tier).collect();
    let candidates: Vec<Candidate<'_>> = foods
      .iter()
      .zip(&tiers)
      .enumerate()
      .filter(|(_, (f, _))| !f.name.trim().is_empty())
      .map(|(i, (f, &tier))| Candidate {
        reference_id: i as i64,
        description: &f.name,
        tier,
      })
      .collect();

    let m = matcher::match_food(food.food_id, &food.name, &candidates, self.floor)?;
    let chosen = usize::try_from(m.reference_id)
      .ok()
      .and_then(|i| foods.get(i))
      .ok_or(ResolutionFailure::NoCandidates)?;

    let mut panel = Nutrients::default();
    for (field, value) in chosen.nutrients.present() {
      if value.is_finite() && value > 0.0 {
        panel.set(field, Some(value));
      }
    }

    debug!(
      food_id = %food.food_id,
      candidate = %chosen.name,
      score = m.score,
      "matched API food"
    );
    Ok(Resolution {
      source:      MergeSource { reference_id: None, tier: m.tier },
      match_score: m.score,
      panel,
    })
  }
}

// ─── Runtime choice ──────────────────────────────────────────────────────────

/// The resolver a worker was configured with.
#[derive(Debug, Clone)]
pub enum Backend {
  Reference(ReferenceResolver),
  Api(ApiResolver),
}

impl Resolver for Backend {
  fn is_remote(&self) -> bool {
    match self {
      Self::Reference(r) => r.is_remote(),
      Self::Api(a) => a.is_remote(),
    }
  }

  async fn resolve(&self, food: &FoodRecord) -> Result<Resolution, ResolutionFailure> {
    match self {
      Self::Reference(r) => r.resolve(food).await,
      Self::Api(a) => a.resolve(food).await,
    }
  }
}
