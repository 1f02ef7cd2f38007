//! Canonical form for free-text food names.
//!
//! `"Chicken, broiler (breast) - raw."` and `"chicken broiler breast raw"`
//! normalise to the same string. Only ASCII case folding is applied; other
//! characters pass through untouched.

use std::collections::BTreeSet;

/// Lowercase, replace punctuation with spaces, collapse whitespace, trim.
///
/// Pure and idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut pending_space = false;

  for c in text.chars() {
    if c.is_whitespace() || is_separator(c) {
      pending_space = !out.is_empty();
      continue;
    }
    if pending_space {
      out.push(' ');
      pending_space = false;
    }
    out.push(c.to_ascii_lowercase());
  }

  out
}

/// The distinct whitespace-separated tokens of the normalised form.
pub fn tokens(text: &str) -> BTreeSet<String> {
  normalize(text)
    .split(' ')
    .filter(|t| !t.is_empty())
    .map(str::to_owned)
    .collect()
}

fn is_separator(c: char) -> bool {
  c.is_ascii_punctuation()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strips_punctuation_and_case() {
    assert_eq!(
      normalize("Chicken, broiler (breast) - RAW."),
      "chicken broiler breast raw"
    );
  }

  #[test]
  fn collapses_and_trims_whitespace() {
    assert_eq!(normalize("  Milk,\t whole \n"), "milk whole");
  }

  #[test]
  fn hyphenated_words_split() {
    assert_eq!(normalize("Semi-skimmed"), "semi skimmed");
  }

  #[test]
  fn punctuation_only_is_empty() {
    assert_eq!(normalize(" ,.-() "), "");
  }

  #[test]
  fn idempotent() {
    for s in [
      "Milk, whole",
      "Bison steak (grilled)",
      "  Brussels   sprouts.",
      "Crème brûlée",
      "",
    ] {
      let once = normalize(s);
      assert_eq!(normalize(&once), once, "input {s:?}");
    }
  }

  #[test]
  fn non_ascii_passes_through() {
    assert_eq!(normalize("Crème Brûlée"), "crème brûlée");
  }

  #[test]
  fn tokens_are_distinct() {
    let t = tokens("Beans, green, green beans");
    assert_eq!(t.len(), 2);
    assert!(t.contains("beans"));
    assert!(t.contains("green"));
  }
}
