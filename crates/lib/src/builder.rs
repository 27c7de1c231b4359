//! The build state machine.
//!
//! A build walks a fixed sequence of stages inside one workspace:
//!
//! ```text
//! init -> write_entry -> [inherit_replaces] -> fetch_plugins -> fetch_base
//!      -> [apply_replaces] -> tidy -> derive_metadata -> compose_args
//!      -> compile -> teardown
//! ```
//!
//! Teardown always runs. Any failure is terminal; nothing is retried.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use crate::args::{ArgsError, BuildArgs};
use crate::config::BuilderConfig;
use crate::consts::{CACHE_ENV_KEYS, ENTRY_FILE};
use crate::context::{BuildContext, Interrupt};
use crate::entrypoint::{self, EntrypointError};
use crate::graph::{self, ModuleGraph};
use crate::metadata::{GithubTags, LocalGit, MetadataError, MetadataResolver, TagLookup, VersionControl};
use crate::spec::{BuildSpec, SpecError};
use crate::template::TemplateError;
use crate::toolchain::{Toolchain, ToolchainError};
use crate::workspace::{Workspace, WorkspaceError};

/// A step of the build state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
  Init,
  WriteEntry,
  InheritReplaces,
  FetchPlugins,
  FetchBase,
  ApplyReplaces,
  Tidy,
  DeriveMetadata,
  ComposeArgs,
  Compile,
  Teardown,
}

impl fmt::Display for BuildStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      BuildStage::Init => "init",
      BuildStage::WriteEntry => "write_entry",
      BuildStage::InheritReplaces => "inherit_replaces",
      BuildStage::FetchPlugins => "fetch_plugins",
      BuildStage::FetchBase => "fetch_base",
      BuildStage::ApplyReplaces => "apply_replaces",
      BuildStage::Tidy => "tidy",
      BuildStage::DeriveMetadata => "derive_metadata",
      BuildStage::ComposeArgs => "compose_args",
      BuildStage::Compile => "compile",
      BuildStage::Teardown => "teardown",
    };
    f.write_str(name)
  }
}

/// Broad classification of a build failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Configuration,
  Io,
  Toolchain,
  Metadata,
  Cancelled,
  TimedOut,
}

/// Errors that can end a build.
#[derive(Debug, Error)]
pub enum BuildError {
  #[error("invalid build configuration: {0}")]
  Config(#[from] SpecError),

  #[error("invalid build arguments: {0}")]
  Args(#[from] ArgsError),

  #[error("failed to render entry file: {0}")]
  Template(#[from] TemplateError),

  #[error("failed to resolve output path '{path}': {source}")]
  Output {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write entry file: {0}")]
  WriteEntry(#[source] io::Error),

  #[error(transparent)]
  Workspace(#[from] WorkspaceError),

  #[error("{stage} failed: {source}")]
  Toolchain {
    stage: BuildStage,
    #[source]
    source: ToolchainError,
  },

  #[error("failed to derive build metadata: {0}")]
  Metadata(#[source] MetadataError),

  #[error("build cancelled during {0}")]
  Cancelled(BuildStage),

  #[error("build timed out during {0}")]
  TimedOut(BuildStage),
}

impl BuildError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      BuildError::Config(_) | BuildError::Args(_) | BuildError::Template(_) => ErrorKind::Configuration,
      BuildError::Output { .. } | BuildError::WriteEntry(_) | BuildError::Workspace(_) => ErrorKind::Io,
      BuildError::Toolchain { .. } => ErrorKind::Toolchain,
      BuildError::Metadata(_) => ErrorKind::Metadata,
      BuildError::Cancelled(_) => ErrorKind::Cancelled,
      BuildError::TimedOut(_) => ErrorKind::TimedOut,
    }
  }

  fn interrupted(stage: BuildStage, interrupt: Interrupt) -> Self {
    match interrupt {
      Interrupt::Cancelled => BuildError::Cancelled(stage),
      Interrupt::DeadlineExceeded => BuildError::TimedOut(stage),
    }
  }

  fn toolchain(stage: BuildStage, source: ToolchainError) -> Self {
    match source.interrupt() {
      Some(interrupt) => Self::interrupted(stage, interrupt),
      None => BuildError::Toolchain { stage, source },
    }
  }

  fn metadata(source: MetadataError) -> Self {
    match source.interrupt() {
      Some(interrupt) => Self::interrupted(BuildStage::DeriveMetadata, interrupt),
      None => BuildError::Metadata(source),
    }
  }
}

impl From<EntrypointError> for BuildError {
  fn from(err: EntrypointError) -> Self {
    match err {
      EntrypointError::Coordinate(err) => BuildError::Config(err),
      EntrypointError::Template(err) => BuildError::Template(err),
    }
  }
}

/// Composes and compiles programs from a `BuildSpec`.
///
/// One builder can run any number of builds, concurrently or not; builds
/// share nothing but the toolchain's module cache.
pub struct Builder<V = LocalGit, T = GithubTags> {
  config: BuilderConfig,
  toolchain: Toolchain,
  vcs: V,
  tags: T,
  span: Span,
}

impl Builder {
  pub fn new(config: BuilderConfig) -> Self {
    let tags = GithubTags::from_config(&config);
    Self::with_collaborators(config, LocalGit, tags)
  }
}

impl<V, T> Builder<V, T>
where
  V: VersionControl + Clone + Send + Sync + 'static,
  T: TagLookup + Sync,
{
  /// Builder with custom version control and tag lookup.
  pub fn with_collaborators(config: BuilderConfig, vcs: V, tags: T) -> Self {
    Self {
      toolchain: Toolchain::new(&config.toolchain),
      config,
      vcs,
      tags,
      span: info_span!("gaia"),
    }
  }

  /// Span every build runs in.
  pub fn with_span(mut self, span: Span) -> Self {
    self.span = span;
    self
  }

  /// Build the program described by `spec` and return the absolute path of
  /// the produced executable.
  ///
  /// Configuration errors are reported before any workspace is created.
  /// Cancelling `cancel` kills the running toolchain command and stops the
  /// build; the workspace is torn down either way.
  pub async fn build(&self, spec: &BuildSpec, cancel: CancellationToken) -> Result<PathBuf, BuildError> {
    let span = info_span!(parent: &self.span, "build", version = %spec.base_version);
    self.run(spec, cancel).instrument(span).await
  }

  async fn run(&self, spec: &BuildSpec, cancel: CancellationToken) -> Result<PathBuf, BuildError> {
    spec.validate()?;
    let source = entrypoint::render(&self.config.base, &spec.plugins)?;
    let output = std::path::absolute(&spec.output).map_err(|source| BuildError::Output {
      path: spec.output.clone(),
      source,
    })?;

    let mut ctx = BuildContext::new(cancel);
    if let Some(timeout) = self.config.build_timeout() {
      ctx = ctx.with_timeout(timeout);
    }

    info!(
      base = %self.config.base.coordinate,
      version = %spec.base_version,
      plugins = spec.plugins.len(),
      output = %output.display(),
      "starting build"
    );

    let mut ws = Workspace::create(spec.workspace_dir.as_deref(), spec.leave_workspace)?;
    let result = self.run_stages(&mut ws, spec, &source, &output, &ctx).await;

    debug!(stage = %BuildStage::Teardown, "entering stage");
    let closed = ws.close();
    if ws.is_retained() {
      info!(dir = %ws.dir().display(), "workspace left in place");
    }

    match (result, closed) {
      (Ok(()), Ok(())) => {
        info!(output = %output.display(), "build complete");
        Ok(output)
      }
      (Ok(()), Err(err)) => Err(err.into()),
      (Err(err), closed) => {
        if let Err(close_err) = closed {
          warn!(error = %close_err, "failed to remove workspace");
        }
        Err(err)
      }
    }
  }

  async fn run_stages(
    &self,
    ws: &mut Workspace,
    spec: &BuildSpec,
    source: &str,
    output: &Path,
    ctx: &BuildContext,
  ) -> Result<(), BuildError> {
    let base = &self.config.base;

    enter(BuildStage::Init, ctx)?;
    self.prepare_env(ws, spec, ctx).await?;
    self
      .toolchain
      .mod_init(ws, &base.main_module, ctx)
      .await
      .map_err(|e| BuildError::toolchain(BuildStage::Init, e))?;

    enter(BuildStage::WriteEntry, ctx)?;
    write_entry(ws, source)?;

    enter(BuildStage::InheritReplaces, ctx)?;
    let graph: ModuleGraph = graph::compose(spec, base, &self.toolchain, ctx)
      .await
      .map_err(|interrupt| BuildError::interrupted(BuildStage::InheritReplaces, interrupt))?;

    let (base_fetch, plugin_fetches) = match graph.fetch.split_last() {
      Some((base_fetch, plugins)) => (Some(base_fetch), plugins),
      None => (None, &[][..]),
    };

    enter(BuildStage::FetchPlugins, ctx)?;
    for module in plugin_fetches {
      self
        .toolchain
        .get(ws, module, ctx)
        .await
        .map_err(|e| BuildError::toolchain(BuildStage::FetchPlugins, e))?;
    }

    enter(BuildStage::FetchBase, ctx)?;
    if let Some(module) = base_fetch {
      self
        .toolchain
        .get(ws, module, ctx)
        .await
        .map_err(|e| BuildError::toolchain(BuildStage::FetchBase, e))?;
    }

    if !graph.replaces.is_empty() {
      enter(BuildStage::ApplyReplaces, ctx)?;
      self
        .toolchain
        .mod_edit_replace(ws, &graph.replaces, ctx)
        .await
        .map_err(|e| BuildError::toolchain(BuildStage::ApplyReplaces, e))?;
    }

    enter(BuildStage::Tidy, ctx)?;
    self
      .toolchain
      .mod_tidy(ws, ctx)
      .await
      .map_err(|e| BuildError::toolchain(BuildStage::Tidy, e))?;

    enter(BuildStage::DeriveMetadata, ctx)?;
    let metadata = MetadataResolver::new(&self.toolchain, &self.vcs, &self.tags)
      .resolve(ws, &graph, base, ctx)
      .await
      .map_err(BuildError::metadata)?;

    enter(BuildStage::ComposeArgs, ctx)?;
    let mut args = BuildArgs::for_mode(spec.debug);
    args.add_tags(&spec.tags).add_metadata(&base.entry_package, &metadata)?;
    let args = args.format();
    debug!(args = ?args, "composed build arguments");

    enter(BuildStage::Compile, ctx)?;
    info!(output = %output.display(), "compiling");
    self
      .toolchain
      .build(ws, ENTRY_FILE, output, &args, ctx)
      .await
      .map_err(|e| BuildError::toolchain(BuildStage::Compile, e))?;

    Ok(())
  }

  /// Seed the workspace overlay with the toolchain's cache locations and the
  /// target platform.
  async fn prepare_env(&self, ws: &mut Workspace, spec: &BuildSpec, ctx: &BuildContext) -> Result<(), BuildError> {
    let mut keys: Vec<&str> = CACHE_ENV_KEYS.to_vec();
    keys.extend(["GOOS", "GOARCH"]);
    let host = self
      .toolchain
      .host_env(&keys, ctx)
      .await
      .map_err(|e| BuildError::toolchain(BuildStage::Init, e))?;

    for key in CACHE_ENV_KEYS {
      if let Some(value) = host.get(*key).filter(|v| !v.is_empty()) {
        ws.set_env(*key, value.as_str());
      }
    }

    let os = spec.platform.os.as_deref().or(host.get("GOOS").map(String::as_str));
    let arch = spec.platform.arch.as_deref().or(host.get("GOARCH").map(String::as_str));
    if let Some(os) = os.filter(|v| !v.is_empty()) {
      ws.set_env("GOOS", os);
    }
    if let Some(arch) = arch.filter(|v| !v.is_empty()) {
      ws.set_env("GOARCH", arch);
    }
    debug!(env = ?ws.env(), "workspace environment");
    Ok(())
  }
}

fn enter(stage: BuildStage, ctx: &BuildContext) -> Result<(), BuildError> {
  ctx
    .check()
    .map_err(|interrupt| BuildError::interrupted(stage, interrupt))?;
  debug!(stage = %stage, "entering stage");
  Ok(())
}

fn write_entry(ws: &Workspace, source: &str) -> Result<(), BuildError> {
  use std::io::Write;

  let mut file = ws.create_file(ENTRY_FILE)?;
  file.write_all(source.as_bytes()).map_err(BuildError::WriteEntry)?;
  file.flush().map_err(BuildError::WriteEntry)?;
  Ok(())
}
