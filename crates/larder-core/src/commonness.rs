//! Static search relevance for food records.
//!
//! Commonness has nothing to do with nutrient completeness: it only orders
//! search results so that "milk" finds whole milk before bison milk. Rules are
//! evaluated top to bottom and the first one that matches wins.

use crate::{food::DEFAULT_COMMONNESS, normalize::normalize};

/// What part of the record a rule looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
  /// The whole normalised name equals one of these.
  NameIs(&'static [&'static str]),
  /// The normalised name contains one of these phrases on word boundaries.
  NameHas(&'static [&'static str]),
  /// Like `NameHas`, but only when the name also carries one of `context`.
  /// For words that are ordinary outside a meat name ("bear claw").
  NameHasWith {
    words:   &'static [&'static str],
    context: &'static [&'static str],
  },
  /// The normalised category contains one of these phrases.
  CategoryHas(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
  pub label:   &'static str,
  pub pattern: Pattern,
  pub score:   u8,
}

/// Words that mark a name as a meat cut.
const MEAT_CONTEXT: &[&str] = &[
  "meat",
  "game",
  "variety meats",
  "beef",
  "pork",
  "lamb",
  "veal",
  "mutton",
  "goat",
  "chicken",
  "turkey",
  "steak",
];

pub const RULES: &[Rule] = &[
  // ── Staple names ────────────────────────────────────────────────────────
  Rule {
    label:   "staple-dairy",
    pattern: Pattern::NameIs(&[
      "milk",
      "milk whole",
      "milk 2",
      "milk reduced fat",
      "milk lowfat",
      "milk nonfat",
      "milk skim",
      "butter",
      "butter salted",
      "cheese cheddar",
      "yogurt plain",
    ]),
    score:   100,
  },
  Rule {
    label:   "staple-basics",
    pattern: Pattern::NameIs(&[
      "egg",
      "eggs",
      "egg whole",
      "egg whole raw",
      "bread white",
      "bread whole wheat",
      "rice white",
      "rice white cooked",
      "rice brown",
      "pasta cooked",
      "oats",
      "banana",
      "banana raw",
      "apple",
      "apples raw",
      "apple raw",
      "orange",
      "potato",
      "potatoes",
      "tomato",
      "tomatoes raw",
      "onion",
      "onions raw",
      "carrot",
      "carrots raw",
      "chicken breast",
      "ground beef",
      "sugar",
      "flour",
      "wheat flour white",
    ]),
    score:   95,
  },
  Rule {
    label:   "staple-broad",
    pattern: Pattern::NameHas(&["chicken breast", "whole milk", "white rice"]),
    score:   90,
  },
  // ── Exotic, game and organ meats ────────────────────────────────────────
  Rule {
    label:   "exotic-protein",
    pattern: Pattern::NameHas(&[
      "bison",
      "buffalo",
      "venison",
      "elk",
      "moose",
      "caribou",
      "antelope",
      "ostrich",
      "emu",
      "kangaroo",
      "alligator",
      "frog legs",
      "squirrel",
      "beaver",
      "opossum",
      "raccoon",
      "turtle",
      "whale",
    ]),
    score:   20,
  },
  Rule {
    label:   "exotic-protein",
    pattern: Pattern::NameHasWith { words: &["bear", "seal"], context: MEAT_CONTEXT },
    score:   20,
  },
  Rule {
    label:   "organ-meat",
    pattern: Pattern::NameHas(&[
      "liver",
      "kidney",
      "kidneys",
      "tongue",
      "tripe",
      "sweetbread",
      "sweetbreads",
      "brain",
      "brains",
      "gizzard",
      "gizzards",
      "spleen",
      "lungs",
      "chitterlings",
    ]),
    score:   25,
  },
  Rule {
    label:   "organ-meat",
    pattern: Pattern::NameHasWith { words: &["heart", "hearts"], context: MEAT_CONTEXT },
    score:   25,
  },
  Rule {
    label:   "uncommon-game",
    pattern: Pattern::NameHas(&["rabbit", "goat", "quail", "pheasant", "squab", "duck", "goose"]),
    score:   35,
  },
  // ── Plant milks and specialty items ─────────────────────────────────────
  Rule {
    label:   "plant-milk",
    pattern: Pattern::NameHas(&[
      "almond milk",
      "oat milk",
      "soy milk",
      "soymilk",
      "rice milk",
      "coconut milk",
      "cashew milk",
      "hemp milk",
      "milk substitute",
    ]),
    score:   40,
  },
  Rule {
    label:   "rare-specialty",
    pattern: Pattern::NameHas(&[
      "durian",
      "breadfruit",
      "jackfruit",
      "kohlrabi",
      "salsify",
      "spirulina",
      "seaweed",
      "agar",
      "natto",
      "tempeh",
      "teff",
      "amaranth",
      "acerola",
      "carob",
    ]),
    score:   30,
  },
  // ── Categories ──────────────────────────────────────────────────────────
  Rule {
    label:   "staple-category",
    pattern: Pattern::CategoryHas(&[
      "dairy and egg",
      "fruits and fruit juices",
      "vegetables and vegetable products",
      "cereal grains and pasta",
      "breakfast cereals",
    ]),
    score:   90,
  },
  Rule {
    label:   "everyday-category",
    pattern: Pattern::CategoryHas(&[
      "poultry",
      "beef",
      "pork",
      "finfish and shellfish",
      "legumes",
      "nut and seed",
      "baked products",
      "beverages",
      "fats and oils",
      "soups sauces",
      "snacks",
      "sweets",
      "spices and herbs",
    ]),
    score:   75,
  },
  Rule {
    label:   "prepared-category",
    pattern: Pattern::CategoryHas(&[
      "fast foods",
      "restaurant foods",
      "meals entrees",
      "branded",
      "baby foods",
      "american indian",
    ]),
    score:   55,
  },
];

/// Compute the commonness score for a record.
pub fn rank(name: &str, category: Option<&str>) -> u8 {
  matching_rule(name, category).map_or(DEFAULT_COMMONNESS, |rule| rule.score)
}

/// The first rule that matches, if any.
pub fn matching_rule(name: &str, category: Option<&str>) -> Option<&'static Rule> {
  let name = normalize(name);
  let category = category.map(normalize).unwrap_or_default();

  RULES.iter().find(|rule| match rule.pattern {
    Pattern::NameIs(names) => names.contains(&name.as_str()),
    Pattern::NameHas(phrases) => phrases.iter().any(|p| has_phrase(&name, p)),
    Pattern::NameHasWith { words, context } => {
      words.iter().any(|w| has_phrase(&name, w)) && context.iter().any(|c| has_phrase(&name, c))
    }
    Pattern::CategoryHas(phrases) => {
      !category.is_empty() && phrases.iter().any(|p| has_phrase(&category, p))
    }
  })
}

/// Word-boundary containment on normalised, single-spaced text.
fn has_phrase(haystack: &str, phrase: &str) -> bool {
  if haystack.is_empty() {
    return false;
  }
  format!(" {haystack} ").contains(&format!(" {phrase} "))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn whole_milk_is_a_staple() {
    assert_eq!(rank("Milk, whole", None), 100);
  }

  #[test]
  fn bison_is_exotic() {
    assert!(rank("Bison steak", None) <= 25);
    assert_eq!(matching_rule("Bison steak", None).unwrap().label, "exotic-protein");
  }

  #[test]
  fn unmatched_names_get_the_default() {
    assert_eq!(rank("Grandma's secret casserole", None), 50);
    assert_eq!(rank("", None), 50);
  }

  #[test]
  fn name_rules_outrank_category_rules() {
    // An organ meat filed under a staple-ish category stays rare.
    assert_eq!(rank("Beef, liver, raw", Some("Beef Products")), 25);
  }

  #[test]
  fn category_rules_apply_when_no_name_rule_does() {
    assert_eq!(rank("Cheese, gouda", Some("Dairy and Egg Products")), 90);
    assert_eq!(rank("Pork chop", Some("Pork Products")), 75);
    assert_eq!(rank("Big burger", Some("Fast Foods")), 55);
  }

  #[test]
  fn plant_milk_does_not_hit_the_dairy_staple() {
    assert_eq!(rank("Almond milk, unsweetened", None), 40);
  }

  #[test]
  fn phrases_match_on_word_boundaries() {
    // "hearts" is not "heart", "elkhorn" is not "elk".
    assert_eq!(rank("Hearts of palm", None), 50);
    assert_eq!(rank("Elkhorn cheese", None), 50);
  }

  #[test]
  fn ambiguous_words_need_a_meat_context() {
    assert_eq!(rank("Bear claw pastry", None), 50);
    assert_eq!(rank("Heart of romaine", None), 50);
    assert_eq!(rank("Seal of approval granola", None), 50);

    assert_eq!(rank("Game meat, bear, raw", None), 20);
    assert_eq!(rank("Seal, bearded (Oogruk), meat, dried", None), 20);
    assert_eq!(rank("Beef, variety meats and by-products, heart, raw", None), 25);
    assert_eq!(matching_rule("Chicken heart", None).unwrap().label, "organ-meat");
  }

  #[test]
  fn every_rule_score_is_in_range() {
    assert!(RULES.iter().all(|r| r.score <= 100));
  }
}
