//! Builder configuration loading.
//!
//! Settings come from an optional TOML file; environment overrides such as
//! `GAIA_GO` are applied on top.

use std::path::Path;

use anyhow::{Context, Result};
use gaia_lib::BuilderConfig;
use tracing::debug;

pub fn load(path: Option<&Path>) -> Result<BuilderConfig> {
  let config = match path {
    Some(path) => {
      let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
      let config: BuilderConfig =
        toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))?;
      debug!(path = %path.display(), "loaded config file");
      config
    }
    None => BuilderConfig::default(),
  };
  Ok(config.with_env_overrides())
}
