//! Go toolchain invocation.
//!
//! Every step of a build is a blocking `go` subcommand run inside the
//! workspace directory with the workspace's environment overlay. Standard
//! error is captured and attached to the error when a command fails. No
//! command is retried.

pub mod types;

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::de::DeserializeOwned;
use tokio::process::Command;
use tracing::{debug, info};

use crate::consts::INHERITED_ENV;
use crate::context::BuildContext;
use crate::spec::ReplaceDirective;
use crate::workspace::Workspace;

pub use types::{GoMod, ModuleFetch, ModuleInfo, ToolchainError};

/// Reads the replace directives declared by a module on disk.
pub trait ModuleIntrospector {
  fn replace_directives(
    &self,
    module_dir: &Path,
    ctx: &BuildContext,
  ) -> impl Future<Output = Result<Vec<ReplaceDirective>, ToolchainError>> + Send;
}

/// Handle on the toolchain binary.
#[derive(Debug, Clone)]
pub struct Toolchain {
  program: PathBuf,
}

impl Toolchain {
  pub fn new(program: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
    }
  }

  /// `go mod init <module>`
  pub async fn mod_init(&self, ws: &Workspace, module: &str, ctx: &BuildContext) -> Result<(), ToolchainError> {
    self.run_in(ws, &["mod", "init", module], ctx).await.map(drop)
  }

  /// `go get <coordinate>[@version]`
  pub async fn get(&self, ws: &Workspace, module: &ModuleFetch, ctx: &BuildContext) -> Result<(), ToolchainError> {
    let query = module.query();
    info!(module = %query, "fetching module");
    self.run_in(ws, &["get", query.as_str()], ctx).await.map(drop)
  }

  /// `go mod edit -replace=...` with every directive in one invocation.
  ///
  /// Does nothing when `replaces` is empty.
  pub async fn mod_edit_replace(
    &self,
    ws: &Workspace,
    replaces: &[ReplaceDirective],
    ctx: &BuildContext,
  ) -> Result<(), ToolchainError> {
    if replaces.is_empty() {
      return Ok(());
    }
    let mut args = vec!["mod".to_string(), "edit".to_string()];
    for replace in replaces {
      info!(replace = %replace, "replacing module");
      args.push(format!("-replace={}", replace.edit_arg()));
    }
    self.run_in(ws, &args, ctx).await.map(drop)
  }

  /// `go mod tidy`
  pub async fn mod_tidy(&self, ws: &Workspace, ctx: &BuildContext) -> Result<(), ToolchainError> {
    self.run_in(ws, &["mod", "tidy"], ctx).await.map(drop)
  }

  /// `go build -o <output> <args...> <src>`
  pub async fn build(
    &self,
    ws: &Workspace,
    src: &str,
    output: &Path,
    args: &[String],
    ctx: &BuildContext,
  ) -> Result<(), ToolchainError> {
    let mut full = vec!["build".to_string(), "-o".to_string(), output.to_string_lossy().into_owned()];
    full.extend(args.iter().cloned());
    full.push(src.to_string());
    self.run_in(ws, &full, ctx).await.map(drop)
  }

  /// `go list -m -json <coordinate>` inside the workspace.
  pub async fn list_module(
    &self,
    ws: &Workspace,
    coordinate: &str,
    ctx: &BuildContext,
  ) -> Result<ModuleInfo, ToolchainError> {
    let args = ["list", "-m", "-json", coordinate];
    let stdout = self.run_in(ws, &args, ctx).await?;
    decode(&self.command_line(&args), &stdout)
  }

  /// `go env -json <keys...>` with the host environment.
  pub async fn host_env(&self, keys: &[&str], ctx: &BuildContext) -> Result<BTreeMap<String, String>, ToolchainError> {
    let mut args = vec!["env", "-json"];
    args.extend_from_slice(keys);
    let stdout = self.run(None, None, &args, ctx).await?;
    decode(&self.command_line(&args), &stdout)
  }

  /// `go mod edit -json <path>`
  pub async fn mod_edit_json(&self, go_mod: &Path, ctx: &BuildContext) -> Result<GoMod, ToolchainError> {
    let path = go_mod.to_string_lossy().into_owned();
    let args = ["mod", "edit", "-json", path.as_str()];
    let stdout = self.run(None, None, &args, ctx).await?;
    decode(&self.command_line(&args), &stdout)
  }

  /// The toolchain's version, e.g. `1.22.4` from `go version go1.22.4 linux/amd64`.
  pub async fn version(&self, ctx: &BuildContext) -> Result<String, ToolchainError> {
    let stdout = self.run(None, None, &["version"], ctx).await?;
    parse_version(&stdout).ok_or_else(|| ToolchainError::UnexpectedOutput {
      command: self.command_line(&["version"]),
      output: stdout.trim().to_string(),
    })
  }

  async fn run_in<S: AsRef<str>>(
    &self,
    ws: &Workspace,
    args: &[S],
    ctx: &BuildContext,
  ) -> Result<String, ToolchainError> {
    self.run(Some(ws.dir()), Some(ws.env()), args, ctx).await
  }

  /// Run one command and return its stdout.
  ///
  /// With an overlay, the child starts from an empty environment holding the
  /// overlay plus `INHERITED_ENV` from the host; without one it inherits the
  /// host environment unchanged.
  async fn run<S: AsRef<str>>(
    &self,
    cwd: Option<&Path>,
    overlay: Option<&[(String, String)]>,
    args: &[S],
    ctx: &BuildContext,
  ) -> Result<String, ToolchainError> {
    let command_line = self.command_line(args);
    if let Err(interrupt) = ctx.check() {
      return Err(ToolchainError::Interrupted {
        command: command_line,
        interrupt,
      });
    }

    let mut command = Command::new(&self.program);
    command
      .args(args.iter().map(|arg| arg.as_ref()))
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    if let Some(dir) = cwd {
      command.current_dir(dir);
    }
    if let Some(overlay) = overlay {
      command.env_clear();
      for key in INHERITED_ENV {
        if let Some(value) = std::env::var_os(key) {
          command.env(key, value);
        }
      }
      for (key, value) in overlay {
        command.env(key, value);
      }
    }

    debug!(cmd = %command_line, cwd = ?cwd, env = ?overlay, "running toolchain command");

    let child = command.spawn().map_err(|source| ToolchainError::Spawn {
      program: self.program.display().to_string(),
      source,
    })?;

    let output = tokio::select! {
      output = child.wait_with_output() => output.map_err(|source| ToolchainError::Io {
        command: command_line.clone(),
        source,
      })?,
      interrupt = ctx.interrupted() => {
        debug!(cmd = %command_line, %interrupt, "killing toolchain command");
        return Err(ToolchainError::Interrupted { command: command_line, interrupt });
      }
    };

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !output.status.success() {
      return Err(ToolchainError::Failed {
        command: command_line,
        code: output.status.code(),
        stderr,
      });
    }
    if !stderr.is_empty() {
      debug!(stderr = %stderr, "command stderr");
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
  }

  fn command_line<S: AsRef<str>>(&self, args: &[S]) -> String {
    let mut line = self.program.display().to_string();
    for arg in args {
      line.push(' ');
      line.push_str(arg.as_ref());
    }
    line
  }
}

impl ModuleIntrospector for Toolchain {
  async fn replace_directives(
    &self,
    module_dir: &Path,
    ctx: &BuildContext,
  ) -> Result<Vec<ReplaceDirective>, ToolchainError> {
    let gomod = self.mod_edit_json(&module_dir.join("go.mod"), ctx).await?;
    Ok(gomod.replace_directives())
  }
}

fn decode<T: DeserializeOwned>(command: &str, stdout: &str) -> Result<T, ToolchainError> {
  serde_json::from_str(stdout).map_err(|source| ToolchainError::Decode {
    command: command.to_string(),
    source,
  })
}

/// Extract the version token from `go version` output.
pub fn parse_version(output: &str) -> Option<String> {
  let token = output.split_whitespace().nth(2)?;
  let version = token.strip_prefix("go").unwrap_or(token);
  (!version.is_empty()).then(|| version.to_string())
}
