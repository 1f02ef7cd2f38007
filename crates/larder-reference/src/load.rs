//! Streaming loaders for the FoodData Central CSV export.
//!
//! Tables are read line by line. Entries are kept only for the four known
//! data types; nutrient rows are kept only for known entries and tracked
//! codes, so memory holds what matching and merging need and nothing else.
//!
//! | File | Columns used |
//! |---|---|
//! | `food.csv` | `fdc_id`, `data_type`, `description`, `food_category_id` |
//! | `food_nutrient.csv` | `fdc_id`, `nutrient_id`, `amount` |
//! | `food_category.csv` (optional) | `id`, `description` |

use std::{
  collections::HashMap,
  fs::File,
  io::{BufRead, BufReader},
  path::Path,
};

use larder_core::{
  food::SourceTier,
  reference::{NutrientValue, ReferenceEntry, is_tracked},
};
use tracing::{debug, info};

use crate::{
  delimited::{Columns, split_record},
  error::{Error, Result},
  index::ReferenceIndex,
};

pub const FOOD_TABLE: &str = "food.csv";
pub const NUTRIENT_TABLE: &str = "food_nutrient.csv";
pub const CATEGORY_TABLE: &str = "food_category.csv";

/// Row counts from one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
  pub rows:      u64,
  pub kept:      u64,
  /// Well-formed rows filtered out (unknown type, entry or code).
  pub skipped:   u64,
  pub malformed: u64,
}

/// Data rows of one table, after the header.
///
/// Blank lines are ignored. Lines that fail to split come back as `None`
/// so callers can count them as malformed.
struct Rows<R> {
  table: &'static str,
  lines: std::iter::Enumerate<std::io::Lines<R>>,
}

impl<R: BufRead> Rows<R> {
  fn open(reader: R, table: &'static str) -> Result<(Columns, Self)> {
    let mut lines = reader.lines().enumerate();
    for (_, line) in lines.by_ref() {
      let line = line?;
      if !line.trim().is_empty() {
        let columns = Columns::from_header(&line)?;
        return Ok((columns, Self { table, lines }));
      }
    }
    Err(Error::MissingHeader { table })
  }
}

impl<R: BufRead> Iterator for Rows<R> {
  type Item = Result<Option<Vec<String>>>;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      let (n, line) = self.lines.next()?;
      let line = match line {
        Ok(line) => line,
        Err(e) => return Some(Err(e.into())),
      };
      if line.trim().is_empty() {
        continue;
      }
      return Some(Ok(match split_record(&line) {
        Ok(fields) => Some(fields),
        Err(e) => {
          debug!(table = self.table, line = n + 1, error = %e, "skipping malformed row");
          None
        }
      }));
    }
  }
}

fn field<'f>(fields: &'f [String], at: usize) -> Option<&'f str> {
  fields.get(at).map(|s| s.trim())
}

/// Read `food_category.csv` into `id → description`.
pub fn load_categories<R: BufRead>(reader: R) -> Result<HashMap<i64, String>> {
  let (columns, rows) = Rows::open(reader, CATEGORY_TABLE)?;
  let id_at = columns.require(CATEGORY_TABLE, "id")?;
  let desc_at = columns.require(CATEGORY_TABLE, "description")?;

  let mut categories = HashMap::new();
  for row in rows {
    let Some(fields) = row? else { continue };
    if let (Some(Ok(id)), Some(desc)) = (
      field(&fields, id_at).map(str::parse::<i64>),
      field(&fields, desc_at),
    ) {
      categories.insert(id, desc.to_owned());
    }
  }
  Ok(categories)
}

/// Stream `food.csv` into `index`.
pub fn load_entries<R: BufRead>(
  reader: R,
  categories: &HashMap<i64, String>,
  index: &mut ReferenceIndex,
) -> Result<LoadStats> {
  let (columns, rows) = Rows::open(reader, FOOD_TABLE)?;
  let id_at = columns.require(FOOD_TABLE, "fdc_id")?;
  let type_at = columns.require(FOOD_TABLE, "data_type")?;
  let desc_at = columns.require(FOOD_TABLE, "description")?;
  let category_at = columns.position("food_category_id");

  let mut stats = LoadStats::default();
  for row in rows {
    stats.rows += 1;
    let Some(fields) = row? else {
      stats.malformed += 1;
      continue;
    };

    let id = field(&fields, id_at).and_then(|s| s.parse::<i64>().ok());
    let description = field(&fields, desc_at).filter(|d| !d.is_empty());
    let (Some(reference_id), Some(description)) = (id, description) else {
      stats.malformed += 1;
      continue;
    };
    let Some(tier) = field(&fields, type_at).and_then(SourceTier::from_data_type) else {
      stats.skipped += 1;
      continue;
    };

    // Numeric ids resolve through the category table; anything else is
    // already a category name (branded exports).
    let category = category_at
      .and_then(|at| field(&fields, at))
      .filter(|c| !c.is_empty())
      .map(|c| match c.parse::<i64>() {
        Ok(id) => categories.get(&id).cloned().unwrap_or_else(|| c.to_owned()),
        Err(_) => c.to_owned(),
      });

    let entry = ReferenceEntry {
      reference_id,
      description: description.to_owned(),
      tier,
      category,
    };
    if index.insert(entry) {
      stats.kept += 1;
    } else {
      stats.skipped += 1;
    }
  }

  info!(
    table = FOOD_TABLE,
    rows = stats.rows,
    kept = stats.kept,
    skipped = stats.skipped,
    malformed = stats.malformed,
    "reference table loaded"
  );
  Ok(stats)
}

/// Stream `food_nutrient.csv` into `index`. Entries must be loaded first.
pub fn load_nutrients<R: BufRead>(reader: R, index: &mut ReferenceIndex) -> Result<LoadStats> {
  let (columns, rows) = Rows::open(reader, NUTRIENT_TABLE)?;
  let id_at = columns.require(NUTRIENT_TABLE, "fdc_id")?;
  let code_at = columns.require(NUTRIENT_TABLE, "nutrient_id")?;
  let amount_at = columns.require(NUTRIENT_TABLE, "amount")?;

  let mut stats = LoadStats::default();
  for row in rows {
    stats.rows += 1;
    let Some(fields) = row? else {
      stats.malformed += 1;
      continue;
    };

    let id = field(&fields, id_at).and_then(|s| s.parse::<i64>().ok());
    let code = field(&fields, code_at).and_then(|s| s.parse::<u32>().ok());
    let (Some(reference_id), Some(code)) = (id, code) else {
      stats.malformed += 1;
      continue;
    };
    if !is_tracked(code) || !index.contains(reference_id) {
      stats.skipped += 1;
      continue;
    }
    // An empty amount means "not measured"; keep nothing for it.
    let Some(amount) = field(&fields, amount_at).and_then(|s| s.parse::<f64>().ok()) else {
      stats.skipped += 1;
      continue;
    };

    index.add_nutrient(NutrientValue { reference_id, code, amount });
    stats.kept += 1;
  }

  info!(
    table = NUTRIENT_TABLE,
    rows = stats.rows,
    kept = stats.kept,
    skipped = stats.skipped,
    malformed = stats.malformed,
    "reference table loaded"
  );
  Ok(stats)
}

fn open(path: &Path) -> Result<BufReader<File>> {
  File::open(path)
    .map(BufReader::new)
    .map_err(|source| Error::Io { path: path.to_owned(), source })
}

/// Load a FoodData Central export directory.
pub fn load_dir(dir: impl AsRef<Path>) -> Result<ReferenceIndex> {
  let dir = dir.as_ref();

  let category_path = dir.join(CATEGORY_TABLE);
  let categories = if category_path.exists() {
    load_categories(open(&category_path)?)?
  } else {
    HashMap::new()
  };

  let mut index = ReferenceIndex::new();
  load_entries(open(&dir.join(FOOD_TABLE))?, &categories, &mut index)?;
  load_nutrients(open(&dir.join(NUTRIENT_TABLE))?, &mut index)?;

  info!(
    dir = %dir.display(),
    entries = index.len(),
    nutrient_rows = index.nutrient_row_count(),
    "reference dataset ready"
  );
  Ok(index)
}
