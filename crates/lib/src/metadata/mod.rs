//! Build metadata embedded into the composed program.
//!
//! Four values are stamped into the base program's entry package at link
//! time: its version, the commit it was built from, the toolchain version and
//! the build date. A locally overridden base program is read from its
//! checkout; otherwise the version comes from the module graph and the commit
//! from the remote repository.

pub mod remote;
pub mod vcs;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::BaseProgram;
use crate::consts::COMMIT_PREFIX_LEN;
use crate::context::{BuildContext, Interrupt};
use crate::graph::ModuleGraph;
use crate::toolchain::{Toolchain, ToolchainError};
use crate::workspace::Workspace;

pub use remote::{GithubTags, RemoteError, TagLookup};
pub use vcs::{LocalGit, VcsError, VersionControl};

/// Errors that can occur while deriving build metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
  #[error(transparent)]
  Toolchain(#[from] ToolchainError),

  #[error(transparent)]
  Vcs(#[from] VcsError),

  #[error(transparent)]
  Remote(#[from] RemoteError),

  #[error("no version recorded for module '{0}'")]
  MissingVersion(String),

  #[error("commit id '{0}' is too short")]
  ShortCommit(String),

  #[error("{0} while resolving build metadata")]
  Interrupted(Interrupt),

  #[error("reading the local checkout did not finish: {0}")]
  Join(tokio::task::JoinError),
}

impl MetadataError {
  pub fn interrupt(&self) -> Option<Interrupt> {
    match self {
      MetadataError::Interrupted(interrupt) => Some(*interrupt),
      MetadataError::Toolchain(err) => err.interrupt(),
      _ => None,
    }
  }
}

/// Version information stamped into the composed program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildMetadata {
  pub version: String,
  pub commit: String,
  pub toolchain_version: String,
  pub timestamp: DateTime<Utc>,
}

impl BuildMetadata {
  /// Link-time variable names and their values, in embedding order.
  pub fn fields(&self) -> Vec<(&'static str, String)> {
    vec![
      ("gitCommit", self.commit.clone()),
      ("version", self.version.clone()),
      ("goVersion", self.toolchain_version.clone()),
      ("buildDate", self.build_date()),
    ]
  }

  /// RFC 3339 build date, or empty for an unset timestamp.
  pub fn build_date(&self) -> String {
    if self.timestamp.timestamp() == 0 {
      return String::new();
    }
    self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
  }
}

/// Derives `BuildMetadata` from the toolchain, a local checkout or the remote.
pub struct MetadataResolver<'a, V, T> {
  toolchain: &'a Toolchain,
  vcs: &'a V,
  tags: &'a T,
}

impl<'a, V, T> MetadataResolver<'a, V, T>
where
  V: VersionControl + Clone + Send + 'static,
  T: TagLookup,
{
  pub fn new(toolchain: &'a Toolchain, vcs: &'a V, tags: &'a T) -> Self {
    Self { toolchain, vcs, tags }
  }

  pub async fn resolve(
    &self,
    ws: &Workspace,
    graph: &ModuleGraph,
    base: &BaseProgram,
    ctx: &BuildContext,
  ) -> Result<BuildMetadata, MetadataError> {
    let timestamp = Utc::now();

    let (version, commit) = match &graph.local_override {
      Some(path) => {
        debug!(path = %path.display(), "reading version from local checkout");
        self.local_revision(path, ctx).await?
      }
      None => {
        let module = self.toolchain.list_module(ws, &base.coordinate, ctx).await?;
        if module.version.is_empty() {
          return Err(MetadataError::MissingVersion(base.coordinate.clone()));
        }
        let commit = self.remote_commit(&module.version, ctx).await?;
        (module.version, commit)
      }
    };

    let toolchain_version = self.toolchain.version(ctx).await?;

    let metadata = BuildMetadata {
      version,
      commit,
      toolchain_version,
      timestamp,
    };
    info!(
      version = %metadata.version,
      commit = %metadata.commit,
      go = %metadata.toolchain_version,
      "resolved build metadata"
    );
    Ok(metadata)
  }

  /// Describe and short commit of a checkout, read off the async executor.
  async fn local_revision(&self, path: &Path, ctx: &BuildContext) -> Result<(String, String), MetadataError> {
    ctx.check().map_err(MetadataError::Interrupted)?;

    let vcs = self.vcs.clone();
    let checkout = path.to_path_buf();
    let lookup = tokio::task::spawn_blocking(move || -> Result<_, VcsError> {
      Ok((vcs.describe(&checkout)?, vcs.short_commit(&checkout)?))
    });

    tokio::select! {
      joined = lookup => Ok(joined.map_err(MetadataError::Join)??),
      interrupt = ctx.interrupted() => Err(MetadataError::Interrupted(interrupt)),
    }
  }

  async fn remote_commit(&self, version: &str, ctx: &BuildContext) -> Result<String, MetadataError> {
    if let Some(commit) = pseudo_version_commit(version) {
      return truncate_commit(commit);
    }

    ctx.check().map_err(MetadataError::Interrupted)?;
    let sha = tokio::select! {
      sha = self.tags.tag_commit(version) => sha?,
      interrupt = ctx.interrupted() => return Err(MetadataError::Interrupted(interrupt)),
    };
    truncate_commit(&sha)
  }
}

fn truncate_commit(sha: &str) -> Result<String, MetadataError> {
  sha
    .get(..COMMIT_PREFIX_LEN)
    .map(str::to_string)
    .ok_or_else(|| MetadataError::ShortCommit(sha.to_string()))
}

/// The commit encoded in a pseudo-version such as
/// `v0.0.0-20240501123000-4bbe83eec0a4`.
///
/// Untagged revisions have no tag to look up remotely.
pub fn pseudo_version_commit(version: &str) -> Option<&str> {
  let version = version.strip_suffix("+incompatible").unwrap_or(version);
  let (rest, rev) = version.rsplit_once('-')?;
  let timestamp = rest.rsplit(['-', '.']).next()?;

  let is_rev = rev.len() == 12 && rev.chars().all(|c| c.is_ascii_hexdigit());
  let is_timestamp = timestamp.len() == 14 && timestamp.chars().all(|c| c.is_ascii_digit());
  (is_rev && is_timestamp).then_some(rev)
}
