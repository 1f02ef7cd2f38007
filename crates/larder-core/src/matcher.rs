//! Approximate matching of food names against reference descriptions.
//!
//! Scoring is a plain heuristic over normalised names:
//!
//! | Relation | Score |
//! |---|---|
//! | identical | 100 |
//! | one contains the other (substring or every token) | 90 |
//! | otherwise | token Jaccard × 100, rounded down |
//!
//! A match is accepted only at or above the acceptance floor (70 by
//! default). Ties go to the higher-trust [`SourceTier`], then to the
//! candidate seen first.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  failure::ResolutionFailure,
  food::SourceTier,
  normalize::normalize,
};

/// Default acceptance floor.
pub const ACCEPT_FLOOR: u8 = 70;

const EXACT: u8 = 100;
const CONTAINS: u8 = 90;

// ─── Types ───────────────────────────────────────────────────────────────────

/// One reference entry offered to the matcher.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
  pub reference_id: i64,
  pub description:  &'a str,
  pub tier:         SourceTier,
}

/// The accepted match for a food record. Never persisted as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
  pub food_id:      Uuid,
  pub reference_id: i64,
  pub score:        u8,
  pub tier:         SourceTier,
}

impl MatchResult {
  pub fn band(&self) -> ConfidenceBand {
    // An accepted match is always >= the floor, which is >= 70.
    ConfidenceBand::from_score(self.score).unwrap_or(ConfidenceBand::Low)
  }
}

/// Reporting bands for accepted matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
  /// 90 and above.
  High,
  /// 80–89.
  Medium,
  /// 70–79.
  Low,
}

impl ConfidenceBand {
  /// `None` for scores under 70.
  pub fn from_score(score: u8) -> Option<Self> {
    match score {
      90.. => Some(Self::High),
      80..=89 => Some(Self::Medium),
      70..=79 => Some(Self::Low),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::High => "high",
      Self::Medium => "medium",
      Self::Low => "low",
    }
  }
}

// ─── Scoring ─────────────────────────────────────────────────────────────────

/// Score two free-text names against each other (0–100).
pub fn score(a: &str, b: &str) -> u8 {
  score_normalized(&normalize(a), &normalize(b))
}

/// Score two already-normalised names.
pub fn score_normalized(a: &str, b: &str) -> u8 {
  if a.is_empty() || b.is_empty() {
    return 0;
  }
  if a == b {
    return EXACT;
  }
  if a.contains(b) || b.contains(a) {
    return CONTAINS;
  }

  let ta: BTreeSet<&str> = a.split(' ').collect();
  let tb: BTreeSet<&str> = b.split(' ').collect();
  if ta.is_subset(&tb) || tb.is_subset(&ta) {
    return CONTAINS;
  }

  let intersection = ta.intersection(&tb).count();
  let union = ta.union(&tb).count();
  // union > 0 because both sides are non-empty.
  (intersection * 100 / union) as u8
}

// ─── Selection ───────────────────────────────────────────────────────────────

/// Pick the best candidate for `food_name`, or explain why none qualifies.
///
/// Deterministic: the same name and candidate sequence always produce the
/// same result.
pub fn match_food(
  food_id: Uuid,
  food_name: &str,
  candidates: &[Candidate<'_>],
  floor: u8,
) -> Result<MatchResult, ResolutionFailure> {
  let best = best_candidate(food_name, candidates)
    .ok_or(ResolutionFailure::NoCandidates)?;

  if best.1 < floor {
    return Err(ResolutionFailure::BelowThreshold { best: best.1 });
  }

  Ok(MatchResult {
    food_id,
    reference_id: best.0.reference_id,
    score: best.1,
    tier: best.0.tier,
  })
}

/// The highest-scoring candidate regardless of the floor.
pub fn best_candidate<'c, 'a>(
  food_name: &str,
  candidates: &'c [Candidate<'a>],
) -> Option<(&'c Candidate<'a>, u8)> {
  let needle = normalize(food_name);
  let mut best: Option<(&Candidate<'a>, u8)> = None;

  for candidate in candidates {
    let s = score_normalized(&needle, &normalize(candidate.description));
    let better = match best {
      None => true,
      Some((b, bs)) => s > bs || (s == bs && candidate.tier < b.tier),
    };
    if better {
      best = Some((candidate, s));
    }
    // Nothing can beat an exact match from the top tier.
    if let Some((b, EXACT)) = best
      && b.tier == SourceTier::Survey
    {
      break;
    }
  }

  best
}
