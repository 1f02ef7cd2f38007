//! Read-only reference catalog types and the nutrient code table.
//!
//! Reference ids live in their own namespace (FoodData Central `fdc_id`);
//! they are never confused with [`FoodRecord`](crate::food::FoodRecord)
//! UUIDs.

use serde::{Deserialize, Serialize};

use crate::{food::{NutrientField, SourceTier}, matcher::Candidate};

/// An entry from the authoritative reference dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
  pub reference_id: i64,
  pub description:  String,
  pub tier:         SourceTier,
  pub category:     Option<String>,
}

impl ReferenceEntry {
  pub fn as_candidate(&self) -> Candidate<'_> {
    Candidate {
      reference_id: self.reference_id,
      description:  &self.description,
      tier:         self.tier,
    }
  }
}

/// One sparse `(entry, nutrient code, amount)` row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NutrientValue {
  pub reference_id: i64,
  pub code:         u32,
  pub amount:       f64,
}

// ─── Code table ──────────────────────────────────────────────────────────────

/// Energy in kcal.
pub const ENERGY_KCAL: u32 = 1008;
/// Atwater general factors energy, used when 1008 is absent.
pub const ENERGY_ATWATER_GENERAL: u32 = 2047;
/// Atwater specific factors energy.
pub const ENERGY_ATWATER_SPECIFIC: u32 = 2048;

/// Map a FoodData Central nutrient id (or its legacy SR number) to the
/// field it fills. Energy fallbacks map to `Calories` too; the merger ranks
/// them.
pub fn field_for_code(code: u32) -> Option<NutrientField> {
  use NutrientField::*;

  let field = match code {
    ENERGY_KCAL | ENERGY_ATWATER_GENERAL | ENERGY_ATWATER_SPECIFIC | 208 => {
      Calories
    }
    1003 | 203 => ProteinG,
    1005 | 205 => CarbsG,
    1004 | 204 => FatG,
    1079 | 291 => FiberG,
    2000 | 269 => SugarG,
    1093 | 307 => SodiumMg,
    1092 | 306 => PotassiumMg,
    1087 | 301 => CalciumMg,
    1089 | 303 => IronMg,
    1090 | 304 => MagnesiumMg,
    1091 | 305 => PhosphorusMg,
    1095 | 309 => ZincMg,
    1106 | 320 => VitaminAUg,
    1162 | 401 => VitaminCMg,
    1114 | 328 => VitaminDUg,
    1109 | 323 => VitaminEMg,
    1185 | 430 => VitaminKUg,
    1175 | 415 => VitaminB6Mg,
    1178 | 418 => VitaminB12Ug,
    1177 | 417 => FolateUg,
    _ => return None,
  };
  Some(field)
}

/// Preference among codes that fill the same field; lower wins.
pub fn code_priority(code: u32) -> u8 {
  match code {
    ENERGY_ATWATER_GENERAL => 1,
    ENERGY_ATWATER_SPECIFIC => 2,
    _ => 0,
  }
}

/// Whether the loader should keep rows for this code at all.
pub fn is_tracked(code: u32) -> bool { field_for_code(code).is_some() }
