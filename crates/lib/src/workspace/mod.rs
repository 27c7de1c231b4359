//! Ephemeral build workspaces.
//!
//! A workspace owns one directory and the environment overlay every toolchain
//! command runs with. It is created at the start of a build and removed at
//! the end unless the caller asked to keep it.

mod lock;

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consts::WORKSPACE_PREFIX;

pub use lock::{LOCK_FILENAME, WorkspaceLock};

/// Errors that can occur while managing a workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
  #[error("failed to create workspace directory {}: {source}", path.display())]
  Create { path: PathBuf, source: io::Error },

  #[error("workspace {} is in use by another build{}", dir.display(), pid.map(|p| format!(" (PID {p})")).unwrap_or_default())]
  InUse { dir: PathBuf, pid: Option<u32> },

  #[error("failed to lock workspace {}: {source}", path.display())]
  Lock { path: PathBuf, source: io::Error },

  #[error("failed to create file {}: {source}", path.display())]
  CreateFile { path: PathBuf, source: io::Error },

  #[error("failed to remove workspace {}: {source}", path.display())]
  Remove { path: PathBuf, source: io::Error },
}

/// An isolated directory plus an ordered environment overlay.
#[derive(Debug)]
pub struct Workspace {
  dir: PathBuf,
  env: Vec<(String, String)>,
  leave: bool,
  closed: bool,
  lock: Option<WorkspaceLock>,
}

impl Workspace {
  /// Create a workspace.
  ///
  /// With `base_dir`, that directory (and its parents) is created and claimed
  /// exclusively. Without it, a fresh temporary directory is used.
  pub fn create(base_dir: Option<&Path>, leave: bool) -> Result<Self, WorkspaceError> {
    let (dir, lock) = match base_dir {
      Some(dir) => {
        fs::create_dir_all(dir).map_err(|source| WorkspaceError::Create {
          path: dir.to_path_buf(),
          source,
        })?;
        let dir = dunce::canonicalize(dir).map_err(|source| WorkspaceError::Create {
          path: dir.to_path_buf(),
          source,
        })?;
        let lock = WorkspaceLock::acquire(&dir)?;
        (dir, Some(lock))
      }
      None => {
        let temp = tempfile::Builder::new()
          .prefix(WORKSPACE_PREFIX)
          .tempdir()
          .map_err(|source| WorkspaceError::Create {
            path: std::env::temp_dir(),
            source,
          })?;
        (temp.keep(), None)
      }
    };

    info!(dir = %dir.display(), "using workspace");

    Ok(Self {
      dir,
      env: Vec::new(),
      leave,
      closed: false,
      lock,
    })
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  /// Overlay entries in first-insertion order.
  pub fn env(&self) -> &[(String, String)] {
    &self.env
  }

  /// Set one overlay variable. An existing key keeps its position.
  pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
    let key = key.into();
    let value = value.into();
    match self.env.iter_mut().find(|(k, _)| *k == key) {
      Some(entry) => entry.1 = value,
      None => self.env.push((key, value)),
    }
  }

  pub fn path(&self, name: &str) -> PathBuf {
    self.dir.join(name)
  }

  /// Create (or truncate) a file inside the workspace.
  pub fn create_file(&self, name: &str) -> Result<File, WorkspaceError> {
    let path = self.path(name);
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
      use std::os::unix::fs::OpenOptionsExt;
      options.mode(0o644);
    }
    options.open(&path).map_err(|source| WorkspaceError::CreateFile { path, source })
  }

  pub fn is_retained(&self) -> bool {
    self.leave
  }

  /// Remove the workspace directory unless it is retained.
  ///
  /// Calling this more than once is a no-op.
  pub fn close(&mut self) -> Result<(), WorkspaceError> {
    if self.closed {
      return Ok(());
    }
    self.closed = true;

    if self.leave {
      self.lock = None;
      info!(dir = %self.dir.display(), "leaving workspace in place");
      return Ok(());
    }

    debug!(dir = %self.dir.display(), "removing workspace");
    let removed = match self.lock.take() {
      Some(lock) => remove_claimed(&self.dir, lock),
      None => fs::remove_dir_all(&self.dir),
    };
    match removed {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(source) => Err(WorkspaceError::Remove {
        path: self.dir.clone(),
        source,
      }),
    }
  }
}

/// Remove a claimed directory without opening a window for another claimant.
///
/// Contents go first while the claim is held, then the lock file, then the
/// directory itself. A directory that is no longer empty at that point has
/// been claimed by someone else and is left alone.
fn remove_claimed(dir: &Path, lock: WorkspaceLock) -> io::Result<()> {
  for entry in fs::read_dir(dir)? {
    let entry = entry?;
    if entry.file_name() == LOCK_FILENAME {
      continue;
    }
    let path = entry.path();
    let removed = if entry.file_type()?.is_dir() {
      fs::remove_dir_all(&path)
    } else {
      fs::remove_file(&path)
    };
    match removed {
      Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
      _ => {}
    }
  }

  match lock.remove() {
    Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
    _ => {}
  }

  match fs::remove_dir(dir) {
    Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => {
      debug!(dir = %dir.display(), "workspace was claimed again, leaving it");
      Ok(())
    }
    other => other,
  }
}

impl Drop for Workspace {
  fn drop(&mut self) {
    if let Err(e) = self.close() {
      warn!(error = %e, "failed to clean up workspace");
    }
  }
}
