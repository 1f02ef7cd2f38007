//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings with a fixed microsecond width
//! and a `Z` suffix, so that text comparison in SQL orders them correctly
//! (claim expiry depends on it). UUIDs are stored as hyphenated lowercase
//! strings.

use chrono::{DateTime, SecondsFormat, Utc};
use larder_core::{
  food::{FoodRecord, NutrientField, Nutrients},
  status::EnrichmentStatus,
};
use rusqlite::types::Value;
use strum::IntoEnumIterator;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Status ──────────────────────────────────────────────────────────────────

pub fn encode_status(s: EnrichmentStatus) -> &'static str { s.as_str() }

pub fn decode_status(s: &str) -> Result<EnrichmentStatus> {
  Ok(EnrichmentStatus::parse(s)?)
}

/// `'a', 'b'` for use inside an SQL `IN (…)`. Status names are fixed
/// identifiers, never user input.
pub fn status_list(statuses: &[EnrichmentStatus]) -> String {
  statuses
    .iter()
    .map(|s| format!("'{}'", s.as_str()))
    .collect::<Vec<_>>()
    .join(", ")
}

// ─── Columns ─────────────────────────────────────────────────────────────────

const RECORD_COLUMNS: &[&str] = &[
  "food_id",
  "name",
  "brand",
  "category",
  "enrichment_status",
  "quality_score",
  "data_sources",
  "last_enrichment",
  "commonness_score",
  "suspect",
  "reference_id",
  "match_score",
  "failure_reason",
  "attempt_count",
  "claimed_by",
  "claimed_at",
  "created_at",
  "updated_at",
];

/// Comma-separated list of every `foods` column, for `SELECT`.
pub fn food_columns() -> String {
  RECORD_COLUMNS
    .iter()
    .copied()
    .chain(NutrientField::iter().map(NutrientField::column))
    .collect::<Vec<_>>()
    .join(", ")
}

fn real(v: Option<f64>) -> Value { v.map_or(Value::Null, Value::Real) }

fn text(v: Option<&str>) -> Value {
  v.map_or(Value::Null, |s| Value::Text(s.to_owned()))
}

fn int(v: Option<i64>) -> Value { v.map_or(Value::Null, Value::Integer) }

/// `(column, value)` for every nutrient field.
pub fn nutrient_values(n: &Nutrients) -> Vec<(&'static str, Value)> {
  NutrientField::iter()
    .map(|f| (f.column(), real(n.get(f))))
    .collect()
}

/// `(column, value)` for every column of a record, in insert order.
pub fn encode_food(r: &FoodRecord) -> Vec<(&'static str, Value)> {
  let mut values = vec![
    ("food_id", Value::Text(encode_uuid(r.food_id))),
    ("name", Value::Text(r.name.clone())),
    ("brand", text(r.brand.as_deref())),
    ("category", text(r.category.as_deref())),
    ("enrichment_status", Value::Text(encode_status(r.status).to_owned())),
    ("quality_score", int(r.quality_score.map(i64::from))),
    ("data_sources", text(r.data_sources.as_deref())),
    ("last_enrichment", text(r.last_enrichment.map(encode_dt).as_deref())),
    ("commonness_score", Value::Integer(i64::from(r.commonness_score))),
    ("suspect", Value::Integer(i64::from(r.suspect))),
    ("reference_id", int(r.reference_id)),
    ("match_score", int(r.match_score.map(i64::from))),
    ("failure_reason", text(r.failure_reason.as_deref())),
    ("attempt_count", Value::Integer(i64::from(r.attempt_count))),
    ("claimed_by", text(r.claimed_by.as_deref())),
    ("claimed_at", text(r.claimed_at.map(encode_dt).as_deref())),
    ("created_at", Value::Text(encode_dt(r.created_at))),
    ("updated_at", Value::Text(encode_dt(r.updated_at))),
  ];
  values.extend(nutrient_values(&r.nutrients));
  values
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `foods` row.
pub struct RawFood {
  pub food_id:          String,
  pub name:             String,
  pub brand:            Option<String>,
  pub category:         Option<String>,
  pub nutrients:        Nutrients,
  pub status:           String,
  pub quality_score:    Option<i64>,
  pub data_sources:     Option<String>,
  pub last_enrichment:  Option<String>,
  pub commonness_score: i64,
  pub suspect:          bool,
  pub reference_id:     Option<i64>,
  pub match_score:      Option<i64>,
  pub failure_reason:   Option<String>,
  pub attempt_count:    i64,
  pub claimed_by:       Option<String>,
  pub claimed_at:       Option<String>,
  pub created_at:       String,
  pub updated_at:       String,
}

impl RawFood {
  /// Read a row selected with [`food_columns`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    let mut nutrients = Nutrients::default();
    for field in NutrientField::iter() {
      nutrients.set(field, row.get(field.column())?);
    }

    Ok(Self {
      food_id: row.get("food_id")?,
      name: row.get("name")?,
      brand: row.get("brand")?,
      category: row.get("category")?,
      nutrients,
      status: row.get("enrichment_status")?,
      quality_score: row.get("quality_score")?,
      data_sources: row.get("data_sources")?,
      last_enrichment: row.get("last_enrichment")?,
      commonness_score: row.get("commonness_score")?,
      suspect: row.get("suspect")?,
      reference_id: row.get("reference_id")?,
      match_score: row.get("match_score")?,
      failure_reason: row.get("failure_reason")?,
      attempt_count: row.get("attempt_count")?,
      claimed_by: row.get("claimed_by")?,
      claimed_at: row.get("claimed_at")?,
      created_at: row.get("created_at")?,
      updated_at: row.get("updated_at")?,
    })
  }

  pub fn into_food(self) -> Result<FoodRecord> {
    Ok(FoodRecord {
      food_id:          decode_uuid(&self.food_id)?,
      name:             self.name,
      brand:            self.brand,
      category:         self.category,
      nutrients:        self.nutrients,
      status:           decode_status(&self.status)?,
      quality_score:    self
        .quality_score
        .map(|v| narrow("quality_score", v))
        .transpose()?,
      data_sources:     self.data_sources,
      last_enrichment:  self.last_enrichment.as_deref().map(decode_dt).transpose()?,
      commonness_score: narrow("commonness_score", self.commonness_score)?,
      suspect:          self.suspect,
      reference_id:     self.reference_id,
      match_score:      self
        .match_score
        .map(|v| narrow("match_score", v))
        .transpose()?,
      failure_reason:   self.failure_reason,
      attempt_count:    narrow("attempt_count", self.attempt_count)?,
      claimed_by:       self.claimed_by,
      claimed_at:       self.claimed_at.as_deref().map(decode_dt).transpose()?,
      created_at:       decode_dt(&self.created_at)?,
      updated_at:       decode_dt(&self.updated_at)?,
    })
  }
}

fn narrow<T: TryFrom<i64>>(column: &'static str, value: i64) -> Result<T> {
  T::try_from(value).map_err(|_| Error::OutOfRange { column, value })
}
