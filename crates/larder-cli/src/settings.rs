//! Layered configuration: optional TOML file, then `LARDER_*` variables.
//!
//! ```toml
//! store_path    = "~/.local/share/larder/larder.db"
//! reference_dir = "~/data/FoodData_Central_csv"
//! port          = 8080
//!
//! [pipeline]
//! batch_size        = 50
//! call_delay_ms     = 250
//! quality_threshold = 70
//!
//! [pipeline.scoring]
//! calorie_tolerance = 30.0
//!
//! [api]
//! base_url = "https://enrich.example.com/v1/search"
//! ```
//!
//! Nested keys use a double underscore in the environment:
//! `LARDER_PIPELINE__BATCH_SIZE=10`.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use larder_core::config::PipelineConfig;
use larder_worker::ApiResolverConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub store_path:    PathBuf,
  /// FoodData Central CSV export used by `work` and `match`.
  pub reference_dir: Option<PathBuf>,
  pub host:          String,
  pub port:          u16,
  pub pipeline:      PipelineConfig,
  /// External enrichment API, used by `work --api`.
  pub api:           Option<ApiResolverConfig>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      store_path:    PathBuf::from("larder.db"),
      reference_dir: None,
      host:          "127.0.0.1".to_string(),
      port:          8080,
      pipeline:      PipelineConfig::default(),
      api:           None,
    }
  }
}

impl Settings {
  /// Read `path` (if it exists) layered under the environment, and expand
  /// `~` in every path setting.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let raw = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("LARDER")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .with_context(|| format!("failed to read config file {}", path.display()))?;

    let mut settings: Settings = raw
      .try_deserialize()
      .context("failed to deserialise settings")?;
    settings.store_path = expand_tilde(&settings.store_path);
    settings.reference_dir = settings.reference_dir.as_deref().map(expand_tilde);
    Ok(settings)
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_means_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let s = Settings::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(s.store_path, PathBuf::from("larder.db"));
    assert_eq!(s.pipeline, PipelineConfig::default());
    assert!(s.api.is_none());
  }

  #[test]
  fn file_values_override_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("larder.toml");
    std::fs::write(
      &path,
      r#"
store_path = "/var/lib/larder/foods.db"
port = 9000

[pipeline]
batch_size = 10
match_floor = 80

[pipeline.scoring]
suspect_cap = 40

[api]
base_url = "http://localhost:7000/search"
max_results = 5
"#,
    )
    .unwrap();

    let s = Settings::load(&path).unwrap();
    assert_eq!(s.store_path, PathBuf::from("/var/lib/larder/foods.db"));
    assert_eq!(s.address(), "127.0.0.1:9000");
    assert_eq!(s.pipeline.batch_size, 10);
    assert_eq!(s.pipeline.match_floor, 80);
    assert_eq!(s.pipeline.max_attempts, 3);
    assert_eq!(s.pipeline.scoring.suspect_cap, 40);
    let api = s.api.unwrap();
    assert_eq!(api.max_results, 5);
    assert_eq!(api.timeout_s, 30);
  }

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/x.db")), PathBuf::from(home).join("x.db"));
    assert_eq!(expand_tilde(Path::new("/abs/x.db")), PathBuf::from("/abs/x.db"));
  }
}
