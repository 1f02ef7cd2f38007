//! FoodData Central reference data: CSV loading and candidate retrieval.

mod delimited;
pub mod error;
mod index;
mod load;

pub use self::{
  error::{Error, Result},
  index::ReferenceIndex,
  load::{
    CATEGORY_TABLE, FOOD_TABLE, LoadStats, NUTRIENT_TABLE, load_categories, load_dir, load_entries,
    load_nutrients,
  },
};
