//! Build specifications.
//!
//! A `BuildSpec` is everything a caller supplies for one build: target
//! platform, base program version, plugins, replace directives and output
//! options. Specs are validated before any workspace is created.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::DEFAULT_VERSION;

/// Errors raised while parsing or validating a build specification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
  #[error("output file name cannot be empty")]
  EmptyOutput,

  #[error("invalid module coordinate '{0}'")]
  InvalidCoordinate(String),

  #[error("replace directive for '{from}' has an empty target")]
  EmptyReplaceTarget { from: String },

  #[error("invalid build tag '{0}'")]
  InvalidTag(String),

  #[error("empty version pin in '{0}'")]
  EmptyVersion(String),
}

/// Target platform, using the toolchain's OS and architecture names.
///
/// Unset fields fall back to the toolchain's own defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
  pub os: Option<String>,
  pub arch: Option<String>,
}

impl Platform {
  pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
    Self {
      os: Some(os.into()),
      arch: Some(arch.into()),
    }
  }
}

/// A plugin module to compose into the base program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginReference {
  pub coordinate: String,
  pub version: Option<String>,
}

impl PluginReference {
  pub fn new(coordinate: impl Into<String>) -> Self {
    Self {
      coordinate: coordinate.into(),
      version: None,
    }
  }

  pub fn with_version(mut self, version: impl Into<String>) -> Self {
    self.version = Some(version.into());
    self
  }
}

impl fmt::Display for PluginReference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.version {
      Some(version) => write!(f, "{}@{}", self.coordinate, version),
      None => write!(f, "{}", self.coordinate),
    }
  }
}

impl FromStr for PluginReference {
  type Err = SpecError;

  /// Parses `coordinate[@version]`.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (coordinate, version) = split_version(s)?;
    validate_coordinate(coordinate)?;
    Ok(Self {
      coordinate: coordinate.to_string(),
      version,
    })
  }
}

/// Substitutes one module coordinate for another during dependency resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceDirective {
  pub from: String,
  /// A local filesystem path or another module coordinate.
  pub to: String,
  pub to_version: Option<String>,
}

impl ReplaceDirective {
  pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
    Self {
      from: from.into(),
      to: to.into(),
      to_version: None,
    }
  }

  pub fn with_version(mut self, version: impl Into<String>) -> Self {
    self.to_version = Some(version.into());
    self
  }

  /// The `from=to[@version]` form accepted by `go mod edit -replace`.
  pub fn edit_arg(&self) -> String {
    match &self.to_version {
      Some(version) => format!("{}={}@{}", self.from, self.to, version),
      None => format!("{}={}", self.from, self.to),
    }
  }
}

impl fmt::Display for ReplaceDirective {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} => {}", self.from, self.to)?;
    if let Some(version) = &self.to_version {
      write!(f, "@{}", version)?;
    }
    Ok(())
  }
}

/// Everything needed to produce one composed executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
  pub platform: Platform,
  /// Version selector for the base program.
  pub base_version: String,
  pub plugins: Vec<PluginReference>,
  pub replacements: Vec<ReplaceDirective>,
  /// Output binary path; made absolute before the build starts.
  pub output: PathBuf,
  /// Build without optimizations and keep debug symbols.
  pub debug: bool,
  pub tags: Vec<String>,
  /// Explicit workspace directory instead of a fresh temporary one.
  pub workspace_dir: Option<PathBuf>,
  /// Keep the workspace on disk after the build.
  pub leave_workspace: bool,
}

impl Default for BuildSpec {
  fn default() -> Self {
    Self {
      platform: Platform::default(),
      base_version: DEFAULT_VERSION.to_string(),
      plugins: Vec::new(),
      replacements: Vec::new(),
      output: PathBuf::new(),
      debug: false,
      tags: Vec::new(),
      workspace_dir: None,
      leave_workspace: false,
    }
  }
}

impl BuildSpec {
  pub fn new(output: impl Into<PathBuf>) -> Self {
    Self {
      output: output.into(),
      ..Self::default()
    }
  }

  /// Adds the plugins and replace directives described by `--with` entries.
  pub fn with_entries<I, S>(mut self, entries: I) -> Result<Self, SpecError>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    for entry in entries {
      let (plugin, replace) = parse_with(entry.as_ref())?;
      self.plugins.push(plugin);
      self.replacements.extend(replace);
    }
    Ok(self)
  }

  /// Checks the spec before any side effect happens.
  pub fn validate(&self) -> Result<(), SpecError> {
    if self.output.as_os_str().is_empty() {
      return Err(SpecError::EmptyOutput);
    }
    for plugin in &self.plugins {
      validate_coordinate(&plugin.coordinate)?;
      if plugin.version.as_deref() == Some("") {
        return Err(SpecError::EmptyVersion(plugin.coordinate.clone()));
      }
    }
    for replace in &self.replacements {
      validate_coordinate(&replace.from)?;
      if replace.to.is_empty() {
        return Err(SpecError::EmptyReplaceTarget {
          from: replace.from.clone(),
        });
      }
    }
    if self.base_version.is_empty() {
      return Err(SpecError::EmptyVersion("base program".to_string()));
    }
    for tag in &self.tags {
      if tag.is_empty() || tag.chars().any(|c| c == ',' || c.is_whitespace() || c == '\'') {
        return Err(SpecError::InvalidTag(tag.clone()));
      }
    }
    Ok(())
  }
}

/// Parses a `coordinate[@version][=target[@version]]` entry.
///
/// The part before `=` names a plugin. When a target is present, a replace
/// directive from the plugin's coordinate to that target is produced too.
pub fn parse_with(entry: &str) -> Result<(PluginReference, Option<ReplaceDirective>), SpecError> {
  let (plugin, target) = match entry.split_once('=') {
    Some((plugin, target)) => (plugin, Some(target)),
    None => (entry, None),
  };

  let plugin: PluginReference = plugin.parse()?;
  let replace = match target {
    Some(target) => {
      let (to, to_version) = split_version(target)?;
      if to.is_empty() {
        return Err(SpecError::EmptyReplaceTarget {
          from: plugin.coordinate.clone(),
        });
      }
      Some(ReplaceDirective {
        from: plugin.coordinate.clone(),
        to: to.to_string(),
        to_version,
      })
    }
    None => None,
  };

  Ok((plugin, replace))
}

fn split_version(s: &str) -> Result<(&str, Option<String>), SpecError> {
  match s.split_once('@') {
    Some((_, "")) => Err(SpecError::EmptyVersion(s.to_string())),
    Some((path, version)) => Ok((path, Some(version.to_string()))),
    None => Ok((s, None)),
  }
}

/// Checks that `coordinate` is a plausible module path.
///
/// Coordinates end up inside generated source code, so only the characters
/// allowed in module paths are accepted.
pub fn validate_coordinate(coordinate: &str) -> Result<(), SpecError> {
  let invalid = || SpecError::InvalidCoordinate(coordinate.to_string());

  if coordinate.is_empty() || coordinate.starts_with(['/', '-', '.']) || coordinate.ends_with('/') {
    return Err(invalid());
  }
  if coordinate.contains("//") {
    return Err(invalid());
  }
  let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~' | '/' | '+');
  if !coordinate.chars().all(allowed) {
    return Err(invalid());
  }
  Ok(())
}
