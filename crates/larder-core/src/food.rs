//! Food records: the mutable entity the pipeline enriches.
//!
//! A [`FoodRecord`] starts life with a name and (usually) an empty nutrient
//! panel. Workers fill the panel from a matched reference entry, stamp a
//! quality score and move the record through the [`EnrichmentStatus`]
//! lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};
use uuid::Uuid;

use crate::{Error, Result, status::EnrichmentStatus};

/// Default search relevance for records that match no commonness rule.
pub const DEFAULT_COMMONNESS: u8 = 50;

// ─── Source tier ─────────────────────────────────────────────────────────────

/// Trust rank of a reference entry's origin, highest-trust first.
///
/// The derived ordering follows declaration order, so `Survey < Branded`
/// means "Survey outranks Branded".
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize, EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
  /// Survey / recipe data (FNDDS).
  Survey,
  /// Lab-analysed foundation foods.
  Foundation,
  /// Standard Reference legacy release.
  SrLegacy,
  /// Branded / commercial label data.
  Branded,
}

impl SourceTier {
  /// The label stamped into `FoodRecord::data_sources`.
  pub fn label(self) -> &'static str {
    match self {
      Self::Survey => "USDA-Survey",
      Self::Foundation => "USDA-Foundation",
      Self::SrLegacy => "USDA-SR-Legacy",
      Self::Branded => "USDA-Branded",
    }
  }

  pub fn from_label(label: &str) -> Result<Self> {
    Self::iter()
      .find(|t| t.label() == label)
      .ok_or_else(|| Error::UnknownTier(label.to_owned()))
  }

  /// Map a FoodData Central `data_type` column value to a tier.
  ///
  /// Sub-sample, market-acquisition and experimental rows have no tier and
  /// return `None`; the loader skips them.
  pub fn from_data_type(data_type: &str) -> Option<Self> {
    match data_type.trim() {
      "survey_fndds_food" => Some(Self::Survey),
      "foundation_food" => Some(Self::Foundation),
      "sr_legacy_food" => Some(Self::SrLegacy),
      "branded_food" => Some(Self::Branded),
      _ => None,
    }
  }
}

// ─── Nutrient fields ─────────────────────────────────────────────────────────

/// Every nutrient column a [`FoodRecord`] tracks.
///
/// Values are per 100 g of edible portion.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum NutrientField {
  // ── Macros ──────────────────────────────────────────────────────────────
  Calories,
  ProteinG,
  CarbsG,
  FatG,
  FiberG,
  SugarG,

  // ── Minerals ────────────────────────────────────────────────────────────
  SodiumMg,
  PotassiumMg,
  CalciumMg,
  IronMg,
  MagnesiumMg,
  PhosphorusMg,
  ZincMg,

  // ── Vitamins ────────────────────────────────────────────────────────────
  VitaminAUg,
  VitaminCMg,
  VitaminDUg,
  VitaminEMg,
  VitaminKUg,
  VitaminB6Mg,
  VitaminB12Ug,
  FolateUg,
}

impl NutrientField {
  /// The column name used in storage and JSON.
  pub fn column(self) -> &'static str {
    match self {
      Self::Calories => "calories",
      Self::ProteinG => "protein_g",
      Self::CarbsG => "carbs_g",
      Self::FatG => "fat_g",
      Self::FiberG => "fiber_g",
      Self::SugarG => "sugar_g",
      Self::SodiumMg => "sodium_mg",
      Self::PotassiumMg => "potassium_mg",
      Self::CalciumMg => "calcium_mg",
      Self::IronMg => "iron_mg",
      Self::MagnesiumMg => "magnesium_mg",
      Self::PhosphorusMg => "phosphorus_mg",
      Self::ZincMg => "zinc_mg",
      Self::VitaminAUg => "vitamin_a_ug",
      Self::VitaminCMg => "vitamin_c_mg",
      Self::VitaminDUg => "vitamin_d_ug",
      Self::VitaminEMg => "vitamin_e_mg",
      Self::VitaminKUg => "vitamin_k_ug",
      Self::VitaminB6Mg => "vitamin_b6_mg",
      Self::VitaminB12Ug => "vitamin_b12_ug",
      Self::FolateUg => "folate_ug",
    }
  }

  /// The four fields scored for macro completeness.
  pub const MACROS: [Self; 4] =
    [Self::Calories, Self::ProteinG, Self::CarbsG, Self::FatG];

  /// The fields scored for micronutrient completeness.
  pub fn micronutrients() -> impl Iterator<Item = Self> {
    Self::iter().filter(|f| f.is_micronutrient())
  }

  pub fn is_micronutrient(self) -> bool {
    !matches!(
      self,
      Self::Calories
        | Self::ProteinG
        | Self::CarbsG
        | Self::FatG
        | Self::FiberG
        | Self::SugarG
    )
  }
}

// ─── Nutrient panel ──────────────────────────────────────────────────────────

/// A sparse nutrient panel. `None` means "not yet known".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Nutrients {
  pub calories:       Option<f64>,
  pub protein_g:      Option<f64>,
  pub carbs_g:        Option<f64>,
  pub fat_g:          Option<f64>,
  pub fiber_g:        Option<f64>,
  pub sugar_g:        Option<f64>,
  pub sodium_mg:      Option<f64>,
  pub potassium_mg:   Option<f64>,
  pub calcium_mg:     Option<f64>,
  pub iron_mg:        Option<f64>,
  pub magnesium_mg:   Option<f64>,
  pub phosphorus_mg:  Option<f64>,
  pub zinc_mg:        Option<f64>,
  pub vitamin_a_ug:   Option<f64>,
  pub vitamin_c_mg:   Option<f64>,
  pub vitamin_d_ug:   Option<f64>,
  pub vitamin_e_mg:   Option<f64>,
  pub vitamin_k_ug:   Option<f64>,
  pub vitamin_b6_mg:  Option<f64>,
  pub vitamin_b12_ug: Option<f64>,
  pub folate_ug:      Option<f64>,
}

impl Nutrients {
  pub fn get(&self, field: NutrientField) -> Option<f64> {
    *self.slot(field)
  }

  pub fn set(&mut self, field: NutrientField, value: Option<f64>) {
    *self.slot_mut(field) = value;
  }

  /// `true` when the field holds a strictly positive value.
  pub fn is_positive(&self, field: NutrientField) -> bool {
    self.get(field).is_some_and(|v| v > 0.0)
  }

  /// The value, treating absent as zero.
  pub fn value_or_zero(&self, field: NutrientField) -> f64 {
    self.get(field).unwrap_or(0.0)
  }

  /// Iterate `(field, value)` over every present field.
  pub fn present(&self) -> impl Iterator<Item = (NutrientField, f64)> + '_ {
    NutrientField::iter().filter_map(|f| self.get(f).map(|v| (f, v)))
  }

  fn slot(&self, field: NutrientField) -> &Option<f64> {
    match field {
      NutrientField::Calories => &self.calories,
      NutrientField::ProteinG => &self.protein_g,
      NutrientField::CarbsG => &self.carbs_g,
      NutrientField::FatG => &self.fat_g,
      NutrientField::FiberG => &self.fiber_g,
      NutrientField::SugarG => &self.sugar_g,
      NutrientField::SodiumMg => &self.sodium_mg,
      NutrientField::PotassiumMg => &self.potassium_mg,
      NutrientField::CalciumMg => &self.calcium_mg,
      NutrientField::IronMg => &self.iron_mg,
      NutrientField::MagnesiumMg => &self.magnesium_mg,
      NutrientField::PhosphorusMg => &self.phosphorus_mg,
      NutrientField::ZincMg => &self.zinc_mg,
      NutrientField::VitaminAUg => &self.vitamin_a_ug,
      NutrientField::VitaminCMg => &self.vitamin_c_mg,
      NutrientField::VitaminDUg => &self.vitamin_d_ug,
      NutrientField::VitaminEMg => &self.vitamin_e_mg,
      NutrientField::VitaminKUg => &self.vitamin_k_ug,
      NutrientField::VitaminB6Mg => &self.vitamin_b6_mg,
      NutrientField::VitaminB12Ug => &self.vitamin_b12_ug,
      NutrientField::FolateUg => &self.folate_ug,
    }
  }

  fn slot_mut(&mut self, field: NutrientField) -> &mut Option<f64> {
    match field {
      NutrientField::Calories => &mut self.calories,
      NutrientField::ProteinG => &mut self.protein_g,
      NutrientField::CarbsG => &mut self.carbs_g,
      NutrientField::FatG => &mut self.fat_g,
      NutrientField::FiberG => &mut self.fiber_g,
      NutrientField::SugarG => &mut self.sugar_g,
      NutrientField::SodiumMg => &mut self.sodium_mg,
      NutrientField::PotassiumMg => &mut self.potassium_mg,
      NutrientField::CalciumMg => &mut self.calcium_mg,
      NutrientField::IronMg => &mut self.iron_mg,
      NutrientField::MagnesiumMg => &mut self.magnesium_mg,
      NutrientField::PhosphorusMg => &mut self.phosphorus_mg,
      NutrientField::ZincMg => &mut self.zinc_mg,
      NutrientField::VitaminAUg => &mut self.vitamin_a_ug,
      NutrientField::VitaminCMg => &mut self.vitamin_c_mg,
      NutrientField::VitaminDUg => &mut self.vitamin_d_ug,
      NutrientField::VitaminEMg => &mut self.vitamin_e_mg,
      NutrientField::VitaminKUg => &mut self.vitamin_k_ug,
      NutrientField::VitaminB6Mg => &mut self.vitamin_b6_mg,
      NutrientField::VitaminB12Ug => &mut self.vitamin_b12_ug,
      NutrientField::FolateUg => &mut self.folate_ug,
    }
  }
}

// ─── FoodRecord ──────────────────────────────────────────────────────────────

/// A food record as persisted by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodRecord {
  pub food_id:          Uuid,
  pub name:             String,
  pub brand:            Option<String>,
  pub category:         Option<String>,
  pub nutrients:        Nutrients,

  // ── Pipeline fields ─────────────────────────────────────────────────────
  pub status:           EnrichmentStatus,
  pub quality_score:    Option<u8>,
  /// Tier label of the reference entry the panel was merged from.
  pub data_sources:     Option<String>,
  pub last_enrichment:  Option<DateTime<Utc>>,
  pub commonness_score: u8,
  /// Set by the calorie audit when calories disagree with the macros.
  pub suspect:          bool,
  pub reference_id:     Option<i64>,
  pub match_score:      Option<u8>,
  /// Last failure or regression reason, cleared on completion.
  pub failure_reason:   Option<String>,

  // ── Queue bookkeeping ───────────────────────────────────────────────────
  pub attempt_count:    u32,
  pub claimed_by:       Option<String>,
  pub claimed_at:       Option<DateTime<Utc>>,
  pub created_at:       DateTime<Utc>,
  pub updated_at:       DateTime<Utc>,
}

impl FoodRecord {
  /// The source tier recorded in `data_sources`, if it parses.
  pub fn tier(&self) -> Option<SourceTier> {
    self
      .data_sources
      .as_deref()
      .and_then(|label| SourceTier::from_label(label).ok())
  }
}

#[cfg(test)]
impl FoodRecord {
  /// A claimed record with an empty panel, for unit tests.
  pub(crate) fn blank(name: &str) -> Self {
    Self {
      food_id:          Uuid::new_v4(),
      name:             name.to_owned(),
      brand:            None,
      category:         None,
      nutrients:        Nutrients::default(),
      status:           EnrichmentStatus::Processing,
      quality_score:    None,
      data_sources:     None,
      last_enrichment:  None,
      commonness_score: DEFAULT_COMMONNESS,
      suspect:          false,
      reference_id:     None,
      match_score:      None,
      failure_reason:   None,
      attempt_count:    1,
      claimed_by:       None,
      claimed_at:       None,
      created_at:       Utc::now(),
      updated_at:       Utc::now(),
    }
  }
}

// ─── NewFood ─────────────────────────────────────────────────────────────────

/// Input to [`crate::store::FoodStore::insert_food`], typically one line of a
/// bulk import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFood {
  pub name:      String,
  #[serde(default)]
  pub brand:     Option<String>,
  #[serde(default)]
  pub category:  Option<String>,
  #[serde(default)]
  pub nutrients: Nutrients,
  /// Import directly into the queue instead of leaving the status unset.
  #[serde(default)]
  pub enqueue:   bool,
}

impl NewFood {
  /// Convenience constructor with an empty nutrient panel.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name:      name.into(),
      brand:     None,
      category:  None,
      nutrients: Nutrients::default(),
      enqueue:   false,
    }
  }
}
