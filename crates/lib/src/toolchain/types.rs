//! Types for toolchain invocation.

use std::io;

use serde::Deserialize;
use thiserror::Error;

use crate::context::Interrupt;
use crate::spec::ReplaceDirective;

/// Errors that can occur while running the toolchain.
#[derive(Debug, Error)]
pub enum ToolchainError {
  /// The toolchain binary could not be started.
  #[error("failed to run '{program}': {source}")]
  Spawn { program: String, source: io::Error },

  /// The command exited unsuccessfully.
  #[error("command failed with exit code {code:?}: {command}: {stderr}")]
  Failed {
    command: String,
    code: Option<i32>,
    stderr: String,
  },

  /// Waiting on the child process failed.
  #[error("io error while running {command}: {source}")]
  Io { command: String, source: io::Error },

  /// The command's JSON output could not be decoded.
  #[error("unexpected JSON from {command}: {source}")]
  Decode {
    command: String,
    source: serde_json::Error,
  },

  /// The command succeeded but printed something unexpected.
  #[error("unexpected output from {command}: {output}")]
  UnexpectedOutput { command: String, output: String },

  /// The build was cancelled or ran out of time while the command ran.
  #[error("{interrupt} while running {command}")]
  Interrupted { command: String, interrupt: Interrupt },
}

impl ToolchainError {
  pub fn interrupt(&self) -> Option<Interrupt> {
    match self {
      ToolchainError::Interrupted { interrupt, .. } => Some(*interrupt),
      _ => None,
    }
  }
}

/// A module to fetch, optionally pinned to a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleFetch {
  pub coordinate: String,
  pub version: Option<String>,
}

impl ModuleFetch {
  /// The `coordinate[@version]` query accepted by `go get`.
  pub fn query(&self) -> String {
    match &self.version {
      Some(version) => format!("{}@{}", self.coordinate, version),
      None => self.coordinate.clone(),
    }
  }
}

/// Structured form of a module file, as printed by `go mod edit -json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GoMod {
  #[serde(default)]
  pub module: ModulePath,
  #[serde(default)]
  pub replace: Option<Vec<GoModReplace>>,
}

impl GoMod {
  /// Declared replace directives in file order.
  pub fn replace_directives(&self) -> Vec<ReplaceDirective> {
    self
      .replace
      .iter()
      .flatten()
      .map(|r| ReplaceDirective {
        from: r.old.path.clone(),
        to: r.new.path.clone(),
        to_version: r.new.version.clone().filter(|v| !v.is_empty()),
      })
      .collect()
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModulePath {
  pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GoModReplace {
  pub old: ModuleVersion,
  pub new: ModuleVersion,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModuleVersion {
  pub path: String,
  #[serde(default)]
  pub version: Option<String>,
}

/// One entry of `go list -m -json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModuleInfo {
  pub path: String,
  #[serde(default)]
  pub version: String,
}
