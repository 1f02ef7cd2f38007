//! Comma-delimited record splitting for the reference tables.
//!
//! Handles the subset of CSV the FoodData Central exports use: one record per
//! line, optional double-quoted fields, `""` as an escaped quote inside a
//! quoted field. Records never span lines.

use crate::error::{Error, Result};

/// Split one line into fields.
pub(crate) fn split_record(line: &str) -> Result<Vec<String>> {
  let line = line.strip_suffix('\r').unwrap_or(line);
  let mut fields = Vec::new();
  let mut field = String::new();
  let mut in_quotes = false;
  let mut chars = line.chars().peekable();

  while let Some(c) = chars.next() {
    match c {
      '"' if in_quotes => {
        if chars.peek() == Some(&'"') {
          field.push('"');
          chars.next();
        } else {
          in_quotes = false;
        }
      }
      '"' if field.is_empty() => in_quotes = true,
      ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
      _ => field.push(c),
    }
  }

  if in_quotes {
    return Err(Error::UnterminatedQuote);
  }
  fields.push(field);
  Ok(fields)
}

/// Column positions resolved from a header row.
#[derive(Debug, Clone)]
pub(crate) struct Columns {
  names: Vec<String>,
}

impl Columns {
  pub(crate) fn from_header(line: &str) -> Result<Self> {
    let line = line.strip_prefix('\u{feff}').unwrap_or(line);
    let names = split_record(line)?
      .into_iter()
      .map(|n| n.trim().to_ascii_lowercase())
      .collect();
    Ok(Self { names })
  }

  /// Index of `column`, or a `MissingColumn` error naming `table`.
  pub(crate) fn require(&self, table: &'static str, column: &'static str) -> Result<usize> {
    self
      .position(column)
      .ok_or(Error::MissingColumn { table, column })
  }

  pub(crate) fn position(&self, column: &str) -> Option<usize> {
    self.names.iter().position(|n| n == column)
  }
}
