//! In-memory reference catalog with an inverted token index.
//!
//! Matching every food against every reference entry does not scale to the
//! few hundred thousand entries FoodData Central ships, so candidates are
//! narrowed to entries sharing a token key with the food name before the
//! matcher scores them. A token's key is its first [`KEY_LEN`] characters, so
//! "banana" and "bananas" land in the same posting list.

use std::collections::{BTreeSet, HashMap};

use larder_core::{
  failure::ResolutionFailure,
  matcher::{self, Candidate, MatchResult},
  normalize::tokens,
  reference::{NutrientValue, ReferenceEntry},
};
use uuid::Uuid;

/// Characters of a token used as its posting-list key.
pub const KEY_LEN: usize = 4;

fn token_key(token: &str) -> String { token.chars().take(KEY_LEN).collect() }

#[derive(Debug, Default)]
pub struct ReferenceIndex {
  /// Entries in load order; positions are the posting-list values.
  entries:   Vec<ReferenceEntry>,
  by_id:     HashMap<i64, usize>,
  postings:  HashMap<String, Vec<usize>>,
  nutrients: HashMap<i64, Vec<NutrientValue>>,
}

impl ReferenceIndex {
  pub fn new() -> Self { Self::default() }

  /// Add an entry. A repeated reference id replaces nothing and is ignored.
  pub fn insert(&mut self, entry: ReferenceEntry) -> bool {
    if self.by_id.contains_key(&entry.reference_id) {
      return false;
    }
    let pos = self.entries.len();
    let keys: BTreeSet<String> = tokens(&entry.description).iter().map(|t| token_key(t)).collect();
    for key in keys {
      self.postings.entry(key).or_default().push(pos);
    }
    self.by_id.insert(entry.reference_id, pos);
    self.entries.push(entry);
    true
  }

  /// Attach a nutrient row. Rows for unknown entries are dropped.
  pub fn add_nutrient(&mut self, value: NutrientValue) -> bool {
    if !self.by_id.contains_key(&value.reference_id) {
      return false;
    }
    self.nutrients.entry(value.reference_id).or_default().push(value);
    true
  }

  pub fn contains(&self, reference_id: i64) -> bool { self.by_id.contains_key(&reference_id) }

  pub fn entry(&self, reference_id: i64) -> Option<&ReferenceEntry> {
    self.by_id.get(&reference_id).map(|&pos| &self.entries[pos])
  }

  /// Nutrient rows for an entry; empty when it has none.
  pub fn nutrients(&self, reference_id: i64) -> &[NutrientValue] {
    self.nutrients.get(&reference_id).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  pub fn nutrient_row_count(&self) -> usize { self.nutrients.values().map(Vec::len).sum() }

  /// Every entry sharing a token key with `name`, in load order.
  pub fn candidates(&self, name: &str) -> Vec<Candidate<'_>> {
    let positions: BTreeSet<usize> = tokens(name)
      .iter()
      .filter_map(|t| self.postings.get(&token_key(t)))
      .flatten()
      .copied()
      .collect();

    positions
      .into_iter()
      .map(|pos| self.entries[pos].as_candidate())
      .collect()
  }

  /// Retrieve candidates for `name` and run the matcher over them.
  pub fn resolve(
    &self,
    food_id: Uuid,
    name: &str,
    floor: u8,
  ) -> Result<MatchResult, ResolutionFailure> {
    matcher::match_food(food_id, name, &self.candidates(name), floor)
  }
}
