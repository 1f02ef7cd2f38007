//! Merging reference nutrient values into a food record.
//!
//! The only rule: a field is written when the reference offers a strictly
//! positive value for it. Zero and missing reference values never touch the
//! record, so sparse reference rows cannot erase good data, and replaying a
//! merge with the same inputs leaves the record exactly as the first run did.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
  failure::ResolutionFailure,
  food::{FoodRecord, NutrientField, Nutrients, SourceTier},
  quality::atwater_kcal,
  reference::{NutrientValue, code_priority, field_for_code},
};

/// What a merge did to the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeOutcome {
  /// Fields the reference supplied a positive value for.
  pub written:            Vec<NutrientField>,
  /// Subset of `written` whose stored value actually changed.
  pub changed:            Vec<NutrientField>,
  /// Calories were derived from the macros (no energy row was available).
  pub calories_estimated: bool,
}

/// Where a panel came from, for the `data_sources` stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSource {
  pub reference_id: Option<i64>,
  pub tier:         SourceTier,
}

/// Collapse sparse nutrient rows into a panel of positive values.
///
/// When several codes map to one field (energy in kcal vs. Atwater energy)
/// the code with the best [`code_priority`] wins; rows for the same code keep
/// the first value seen.
pub fn extract(values: &[NutrientValue]) -> Nutrients {
  let mut chosen: HashMap<NutrientField, (u8, f64)> = HashMap::new();

  for value in values {
    let Some(field) = field_for_code(value.code) else {
      continue;
    };
    if !(value.amount.is_finite() && value.amount > 0.0) {
      continue;
    }
    let priority = code_priority(value.code);
    match chosen.get(&field) {
      Some((p, _)) if *p <= priority => {}
      _ => {
        chosen.insert(field, (priority, value.amount));
      }
    }
  }

  let mut panel = Nutrients::default();
  for (field, (_, amount)) in chosen {
    panel.set(field, Some(amount));
  }
  panel
}

/// Merge reference rows for `reference_id` into `record`.
pub fn merge(
  record: &mut FoodRecord,
  reference_id: i64,
  tier: SourceTier,
  values: &[NutrientValue],
) -> Result<MergeOutcome, ResolutionFailure> {
  let panel = extract(values);
  merge_panel(
    record,
    MergeSource { reference_id: Some(reference_id), tier },
    &panel,
  )
  .ok_or(ResolutionFailure::MergeNoOp { reference_id })
}

/// Merge an already-extracted panel. Returns `None` when the panel holds no
/// positive value at all, in which case the record is left untouched.
pub fn merge_panel(
  record: &mut FoodRecord,
  source: MergeSource,
  panel: &Nutrients,
) -> Option<MergeOutcome> {
  let mut outcome = MergeOutcome::default();

  for (field, value) in panel.present() {
    if !(value.is_finite() && value > 0.0) {
      continue;
    }
    if record.nutrients.get(field) != Some(value) {
      outcome.changed.push(field);
    }
    record.nutrients.set(field, Some(value));
    outcome.written.push(field);
  }

  if outcome.written.is_empty() {
    return None;
  }

  if !record.nutrients.is_positive(NutrientField::Calories) {
    let estimate = atwater_kcal(&record.nutrients);
    if estimate > 0.0 {
      let rounded = (estimate * 10.0).round() / 10.0;
      if record.nutrients.calories != Some(rounded) {
        outcome.changed.push(NutrientField::Calories);
      }
      record.nutrients.calories = Some(rounded);
      outcome.calories_estimated = true;
    }
  }

  record.data_sources = Some(source.tier.label().to_owned());
  // A source without a catalogue id must not leave a stale one behind.
  record.reference_id = source.reference_id;

  Some(outcome)
}

#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator;

  use super::*;
  use crate::reference::ENERGY_ATWATER_GENERAL;

  fn blank(name: &str) -> FoodRecord { FoodRecord::blank(name) }

  fn row(code: u32, amount: f64) -> NutrientValue {
    NutrientValue { reference_id: 171077, code, amount }
  }

  fn chicken_rows() -> Vec<NutrientValue> {
    vec![
      row(1008, 120.0),
      row(1003, 22.5),
      row(1004, 2.62),
      row(1005, 0.0),
      row(1093, 45.0),
      row(1092, 334.0),
    ]
  }

  #[test]
  fn writes_only_positive_values() {
    let mut r = blank("Chicken Breast");
    let out = merge(&mut r, 171077, SourceTier::Foundation, &chicken_rows()).unwrap();

    assert_eq!(r.nutrients.calories, Some(120.0));
    assert_eq!(r.nutrients.protein_g, Some(22.5));
    assert_eq!(r.nutrients.carbs_g, None);
    assert_eq!(out.written.len(), 5);
    assert_eq!(r.data_sources.as_deref(), Some("USDA-Foundation"));
    assert_eq!(r.reference_id, Some(171077));
  }

  #[test]
  fn zero_never_overwrites_existing_value() {
    let mut r = blank("Chicken Breast");
    r.nutrients.carbs_g = Some(1.5);
    r.nutrients.fiber_g = Some(0.4);
    merge(
      &mut r,
      171077,
      SourceTier::Foundation,
      &[row(1005, 0.0), row(1003, 22.5)],
    )
    .unwrap();
    assert_eq!(r.nutrients.carbs_g, Some(1.5));
    assert_eq!(r.nutrients.fiber_g, Some(0.4));
  }

  #[test]
  fn merge_never_turns_a_positive_value_into_zero() {
    let mut r = blank("x");
    for field in NutrientField::iter() {
      r.nutrients.set(field, Some(5.0));
    }
    let before = r.nutrients.clone();
    let zeros: Vec<_> = [1008, 1003, 1005, 1004, 1093, 1162]
      .into_iter()
      .map(|c| row(c, 0.0))
      .chain([row(1079, 3.0)])
      .collect();
    merge(&mut r, 1, SourceTier::SrLegacy, &zeros).unwrap();
    for field in NutrientField::iter() {
      assert!(r.nutrients.value_or_zero(field) > 0.0, "{}", field.column());
      if field != NutrientField::FiberG {
        assert_eq!(r.nutrients.get(field), before.get(field));
      }
    }
  }

  #[test]
  fn idempotent() {
    let mut once = blank("Chicken Breast");
    once.nutrients.iron_mg = Some(0.4);
    let mut twice = once.clone();

    merge(&mut once, 171077, SourceTier::Foundation, &chicken_rows()).unwrap();
    merge(&mut twice, 171077, SourceTier::Foundation, &chicken_rows()).unwrap();
    let second = merge(&mut twice, 171077, SourceTier::Foundation, &chicken_rows())
      .unwrap();

    assert_eq!(once.nutrients, twice.nutrients);
    assert_eq!(once.data_sources, twice.data_sources);
    assert_eq!(once.reference_id, twice.reference_id);
    assert!(second.changed.is_empty());
  }

  #[test]
  fn no_usable_values_is_a_no_op_failure() {
    let mut r = blank("Mystery");
    let err = merge(&mut r, 99, SourceTier::Branded, &[row(1008, 0.0), row(1062, 400.0)])
      .unwrap_err();
    assert_eq!(err, ResolutionFailure::MergeNoOp { reference_id: 99 });
    assert!(r.data_sources.is_none());
  }

  #[test]
  fn atwater_energy_is_a_fallback() {
    let panel = extract(&[row(ENERGY_ATWATER_GENERAL, 130.0), row(1008, 125.0)]);
    assert_eq!(panel.calories, Some(125.0));

    let panel = extract(&[row(ENERGY_ATWATER_GENERAL, 130.0)]);
    assert_eq!(panel.calories, Some(130.0));
  }

  #[test]
  fn calories_estimated_from_macros_when_missing() {
    let mut r = blank("Lentils");
    let out = merge(
      &mut r,
      5,
      SourceTier::Foundation,
      &[row(1003, 9.0), row(1005, 20.0), row(1004, 0.4)],
    )
    .unwrap();
    assert!(out.calories_estimated);
    assert_eq!(r.nutrients.calories, Some(119.6));
  }

  #[test]
  fn sources_without_an_id_clear_the_previous_one() {
    let mut r = blank("Chicken Breast");
    merge(&mut r, 171077, SourceTier::Foundation, &chicken_rows()).unwrap();
    assert_eq!(r.reference_id, Some(171077));

    let panel = Nutrients { calories: Some(110.0), protein_g: Some(23.0), ..Default::default() };
    let source = MergeSource { reference_id: None, tier: SourceTier::Branded };
    merge_panel(&mut r, source, &panel).unwrap();
    assert_eq!(r.reference_id, None);
    assert_eq!(r.data_sources.as_deref(), Some(SourceTier::Branded.label()));
  }
}
