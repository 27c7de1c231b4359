//! Version information from a local checkout.

use std::path::{Path, PathBuf};

use gix::commit::describe::SelectRef;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while reading a local checkout.
#[derive(Debug, Error)]
pub enum VcsError {
  /// The path is not inside a git repository.
  #[error("failed to open repository at '{path}': {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: Box<gix::discover::Error>,
  },

  /// HEAD does not point at a commit.
  #[error("failed to resolve HEAD in '{path}': {message}")]
  ResolveHead { path: PathBuf, message: String },

  /// Describing HEAD failed.
  #[error("failed to describe HEAD in '{path}': {message}")]
  Describe { path: PathBuf, message: String },
}

/// Source of version and commit information for a local checkout.
pub trait VersionControl {
  /// Human readable version of the checkout's HEAD, like `git describe --always`.
  fn describe(&self, path: &Path) -> Result<String, VcsError>;

  /// Abbreviated commit id of HEAD, like `git rev-parse --short HEAD`.
  fn short_commit(&self, path: &Path) -> Result<String, VcsError>;
}

/// Reads checkouts with gix.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalGit;

impl LocalGit {
  fn open(path: &Path) -> Result<gix::Repository, VcsError> {
    gix::discover(path).map_err(|e| VcsError::Open {
      path: path.to_path_buf(),
      source: Box::new(e),
    })
  }
}

impl VersionControl for LocalGit {
  fn describe(&self, path: &Path) -> Result<String, VcsError> {
    let repo = Self::open(path)?;
    let commit = repo.head_commit().map_err(|e| VcsError::ResolveHead {
      path: path.to_path_buf(),
      message: e.to_string(),
    })?;

    let format = commit
      .describe()
      .names(SelectRef::AnnotatedTags)
      .id_as_fallback(true)
      .try_format()
      .map_err(|e| VcsError::Describe {
        path: path.to_path_buf(),
        message: e.to_string(),
      })?
      .ok_or_else(|| VcsError::Describe {
        path: path.to_path_buf(),
        message: "no name found for HEAD".to_string(),
      })?;

    let described = format.to_string();
    debug!(path = %path.display(), version = %described, "described local checkout");
    Ok(described)
  }

  fn short_commit(&self, path: &Path) -> Result<String, VcsError> {
    let repo = Self::open(path)?;
    let id = repo.head_id().map_err(|e| VcsError::ResolveHead {
      path: path.to_path_buf(),
      message: e.to_string(),
    })?;
    Ok(id.shorten_or_id().to_string())
  }
}
