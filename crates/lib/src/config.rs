//! Builder configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::consts::{
  BASE_COORDINATE, BASE_ENTRY_PACKAGE, DEFAULT_TOOLCHAIN, GITHUB_API_URL, MAIN_MODULE, TOOLCHAIN_ENV,
};

/// The program every build is composed around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseProgram {
  /// Module coordinate of the base program.
  pub coordinate: String,
  /// Package exposing `Main()` and the version variables set at link time.
  pub entry_package: String,
  /// Module name used for the synthesized program.
  pub main_module: String,
  /// Repository owner on the remote repository API.
  pub owner: String,
  /// Repository name on the remote repository API.
  pub repo: String,
}

impl Default for BaseProgram {
  fn default() -> Self {
    Self {
      coordinate: BASE_COORDINATE.to_string(),
      entry_package: BASE_ENTRY_PACKAGE.to_string(),
      main_module: MAIN_MODULE.to_string(),
      owner: "cs3org".to_string(),
      repo: "reva".to_string(),
    }
  }
}

/// Configuration shared by every build run through a `Builder`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
  /// Toolchain binary (name looked up on `PATH`, or a path).
  pub toolchain: PathBuf,
  pub base: BaseProgram,
  /// Base URL of the remote repository API used to resolve tag commits.
  pub api_url: String,
  /// Deadline applied to each build, in milliseconds.
  pub build_timeout_ms: Option<u64>,
}

impl Default for BuilderConfig {
  fn default() -> Self {
    Self {
      toolchain: PathBuf::from(DEFAULT_TOOLCHAIN),
      base: BaseProgram::default(),
      api_url: GITHUB_API_URL.to_string(),
      build_timeout_ms: None,
    }
  }
}

impl BuilderConfig {
  /// Applies overrides from the process environment.
  ///
  /// `GAIA_GO` replaces the configured toolchain when set and non-empty.
  pub fn with_env_overrides(mut self) -> Self {
    if let Some(toolchain) = std::env::var_os(TOOLCHAIN_ENV).filter(|v| !v.is_empty()) {
      self.toolchain = PathBuf::from(toolchain);
    }
    self
  }

  pub fn build_timeout(&self) -> Option<Duration> {
    self.build_timeout_ms.map(Duration::from_millis)
  }

  /// Sets the per-build deadline, rounded down to whole milliseconds but
  /// never below one.
  pub fn with_build_timeout(mut self, timeout: Duration) -> Self {
    let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    self.build_timeout_ms = Some(millis.max(1));
    self
  }
}
