//! Completeness and consistency scoring for food records.
//!
//! The score is a sum of three parts, then capped by the calorie audit:
//!
//! - macro completeness, up to 40 (10 each for calories, protein, carbs,
//!   fat),
//! - micronutrient completeness, up to 30, proportional to the share of the
//!   fifteen tracked micronutrients with a positive value,
//! - a source-tier bonus: Survey/Foundation 20, SR Legacy 10, Branded 0.
//!
//! The calorie audit compares stored calories with `4P + 4C + 9F`. A
//! disagreement beyond the tolerance caps the score (50 by default) and marks
//! the record suspect. That cap is what pulls corrupted `completed` records
//! back under the re-enrichment threshold.
//!
//! All weights are tunable through [`ScoringWeights`].

use serde::{Deserialize, Serialize};

use crate::food::{FoodRecord, NutrientField, Nutrients, SourceTier};

/// Reason recorded when the audit regresses a record.
pub const REASON_CALORIE_MISMATCH: &str = "calorie/macro mismatch";
/// Reason recorded when a record regresses for plain incompleteness.
pub const REASON_LOW_QUALITY: &str = "quality below threshold";

// ─── Weights ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
  /// Points per complete macro (four macros).
  pub per_macro:          u8,
  /// Points at full micronutrient coverage.
  pub micronutrients:     u8,
  pub survey_bonus:       u8,
  pub foundation_bonus:   u8,
  pub sr_legacy_bonus:    u8,
  pub branded_bonus:      u8,
  /// Allowed |calories − expected| in kcal.
  pub calorie_tolerance:  f64,
  /// Score ceiling for records failing the audit.
  pub suspect_cap:        u8,
}

impl Default for ScoringWeights {
  fn default() -> Self {
    Self {
      per_macro:         10,
      micronutrients:    30,
      survey_bonus:      20,
      foundation_bonus:  20,
      sr_legacy_bonus:   10,
      branded_bonus:     0,
      calorie_tolerance: 30.0,
      suspect_cap:       50,
    }
  }
}

impl ScoringWeights {
  pub fn tier_bonus(&self, tier: Option<SourceTier>) -> u8 {
    match tier {
      Some(SourceTier::Survey) => self.survey_bonus,
      Some(SourceTier::Foundation) => self.foundation_bonus,
      Some(SourceTier::SrLegacy) => self.sr_legacy_bonus,
      Some(SourceTier::Branded) | None => self.branded_bonus,
    }
  }
}

// ─── Calorie audit ───────────────────────────────────────────────────────────

/// Energy implied by the macros using general Atwater factors.
pub fn atwater_kcal(n: &Nutrients) -> f64 {
  4.0 * n.value_or_zero(NutrientField::ProteinG)
    + 4.0 * n.value_or_zero(NutrientField::CarbsG)
    + 9.0 * n.value_or_zero(NutrientField::FatG)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalorieAudit {
  pub calories:   f64,
  pub expected:   f64,
  pub delta:      f64,
  pub consistent: bool,
}

/// Audit calories against the macros.
///
/// Returns `None` when there is nothing to compare: calories are absent, or
/// no macro is present at all.
pub fn audit(n: &Nutrients, tolerance: f64) -> Option<CalorieAudit> {
  let calories = n.calories?;
  let any_macro = [NutrientField::ProteinG, NutrientField::CarbsG, NutrientField::FatG]
    .into_iter()
    .any(|f| n.get(f).is_some());
  if !any_macro {
    return None;
  }

  let expected = atwater_kcal(n);
  let delta = (calories - expected).abs();
  Some(CalorieAudit {
    calories,
    expected,
    delta,
    consistent: delta <= tolerance,
  })
}

// ─── Score ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
  pub score:        u8,
  pub macro_points: u8,
  pub micro_points: u8,
  pub tier_bonus:   u8,
  pub audit:        Option<CalorieAudit>,
  /// The audit failed and the score was capped.
  pub suspect:      bool,
}

/// Score a stored record using the tier in its `data_sources` stamp.
pub fn score(record: &FoodRecord, weights: &ScoringWeights) -> QualityReport {
  score_panel(&record.nutrients, record.tier(), weights)
}

/// Score a nutrient panel from a given tier.
pub fn score_panel(
  n: &Nutrients,
  tier: Option<SourceTier>,
  weights: &ScoringWeights,
) -> QualityReport {
  let audit = audit(n, weights.calorie_tolerance);
  let consistent = audit.is_some_and(|a| a.consistent);

  let zero_calorie = n.calories == Some(0.0)
    && NutrientField::MACROS[1..].iter().all(|f| !n.is_positive(*f));

  let complete_macros = NutrientField::MACROS
    .iter()
    .filter(|&&f| {
      n.is_positive(f)
        || zero_calorie
        || (f != NutrientField::Calories
          && n.is_positive(NutrientField::Calories)
          && consistent)
    })
    .count() as u32;
  let macro_points = (complete_macros * weights.per_macro as u32).min(u8::MAX as u32) as u8;

  let micro_total = NutrientField::micronutrients().count() as u32;
  let micro_present = NutrientField::micronutrients()
    .filter(|f| n.is_positive(*f))
    .count() as u32;
  let micro_points = (weights.micronutrients as u32 * micro_present / micro_total) as u8;

  let tier_bonus = weights.tier_bonus(tier);

  let raw = (macro_points as u32 + micro_points as u32 + tier_bonus as u32).min(100) as u8;
  let suspect = audit.is_some_and(|a| !a.consistent);
  let score = if suspect { raw.min(weights.suspect_cap) } else { raw };

  QualityReport {
    score,
    macro_points,
    micro_points,
    tier_bonus,
    audit,
    suspect,
  }
}

// ─── Regression ──────────────────────────────────────────────────────────────

/// Why a completed record is being sent back to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regression {
  CalorieMismatch,
  LowQuality,
}

impl Regression {
  pub fn reason(self) -> &'static str {
    match self {
      Self::CalorieMismatch => REASON_CALORIE_MISMATCH,
      Self::LowQuality => REASON_LOW_QUALITY,
    }
  }
}

/// Decide whether a scored record falls under `threshold`.
pub fn regression(report: &QualityReport, threshold: u8) -> Option<Regression> {
  if report.score >= threshold {
    None
  } else if report.suspect {
    Some(Regression::CalorieMismatch)
  } else {
    Some(Regression::LowQuality)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn panel(cal: f64, p: f64, c: f64, f: f64) -> Nutrients {
    Nutrients {
      calories: Some(cal),
      protein_g: Some(p),
      carbs_g: Some(c),
      fat_g: Some(f),
      ..Default::default()
    }
  }

  fn with_micros(mut n: Nutrients, count: usize) -> Nutrients {
    for field in NutrientField::micronutrients().take(count) {
      n.set(field, Some(1.0));
    }
    n
  }

  #[test]
  fn cooked_chicken_is_consistent() {
    let n = panel(165.0, 31.0, 0.0, 3.6);
    let a = audit(&n, 30.0).unwrap();
    assert!((a.expected - 156.4).abs() < 1e-9);
    assert!((a.delta - 8.6).abs() < 1e-9);
    assert!(a.consistent);

    let r = score_panel(&n, Some(SourceTier::Foundation), &ScoringWeights::default());
    assert!(!r.suspect);
    // carbs are legitimately zero
    assert_eq!(r.macro_points, 40);
  }

  #[test]
  fn inflated_brussels_sprouts_are_flagged() {
    let n = with_micros(panel(500.0, 3.4, 9.0, 0.3), 15);
    let r = score_panel(&n, Some(SourceTier::Foundation), &ScoringWeights::default());
    assert!(r.suspect);
    assert_eq!(r.score, 50);
    assert_eq!(regression(&r, 70), Some(Regression::CalorieMismatch));
    assert_eq!(Regression::CalorieMismatch.reason(), "calorie/macro mismatch");
  }

  #[test]
  fn full_foundation_record_scores_100() {
    let n = with_micros(panel(43.0, 3.4, 9.0, 0.3), 15);
    let r = score_panel(&n, Some(SourceTier::Foundation), &ScoringWeights::default());
    assert_eq!(r.score, 100);
    assert_eq!(regression(&r, 70), None);
  }

  #[test]
  fn tier_bonus_tracks_trust() {
    let n = with_micros(panel(43.0, 3.4, 9.0, 0.3), 15);
    let w = ScoringWeights::default();
    assert_eq!(score_panel(&n, Some(SourceTier::Survey), &w).tier_bonus, 20);
    assert_eq!(score_panel(&n, Some(SourceTier::SrLegacy), &w).score, 80);
    assert_eq!(score_panel(&n, Some(SourceTier::Branded), &w).score, 70);
  }

  #[test]
  fn micronutrient_points_are_proportional() {
    let n = with_micros(panel(43.0, 3.4, 9.0, 0.3), 5);
    let r = score_panel(&n, None, &ScoringWeights::default());
    assert_eq!(r.micro_points, 10);
  }

  #[test]
  fn empty_record_scores_zero() {
    let r = score_panel(&Nutrients::default(), None, &ScoringWeights::default());
    assert_eq!(r.score, 0);
    assert!(r.audit.is_none());
    assert_eq!(regression(&r, 70), Some(Regression::LowQuality));
  }

  #[test]
  fn zero_calorie_foods_count_their_macros() {
    let n = panel(0.0, 0.0, 0.0, 0.0);
    let r = score_panel(&n, Some(SourceTier::SrLegacy), &ScoringWeights::default());
    assert_eq!(r.macro_points, 40);
    assert!(!r.suspect);
  }

  #[test]
  fn pure_fat_counts_zero_protein_and_carbs() {
    let n = Nutrients {
      calories: Some(884.0),
      fat_g: Some(100.0),
      ..Default::default()
    };
    let r = score_panel(&n, Some(SourceTier::SrLegacy), &ScoringWeights::default());
    assert_eq!(r.macro_points, 40);
  }

  #[test]
  fn calories_without_macros_are_not_audited() {
    let n = Nutrients { calories: Some(500.0), ..Default::default() };
    let r = score_panel(&n, None, &ScoringWeights::default());
    assert!(r.audit.is_none());
    assert_eq!(r.macro_points, 10);
  }

  #[test]
  fn suspect_cap_is_tunable() {
    let n = with_micros(panel(500.0, 3.4, 9.0, 0.3), 15);
    let w = ScoringWeights { suspect_cap: 20, ..Default::default() };
    assert_eq!(score_panel(&n, Some(SourceTier::Foundation), &w).score, 20);
  }
}
