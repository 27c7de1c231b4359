//! Exclusive claim on an explicitly chosen workspace directory.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::WorkspaceError;

pub const LOCK_FILENAME: &str = ".gaia-workspace.lock";

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub pid: u32,
  pub started_at_unix: u64,
}

/// Held for as long as a build owns the directory.
#[derive(Debug)]
pub struct WorkspaceLock {
  _file: File,
  lock_path: PathBuf,
}

/// Attempts before giving up on a lock file that keeps being replaced.
const ACQUIRE_ATTEMPTS: usize = 8;

impl WorkspaceLock {
  /// Claim `dir`, recreating it if a previous owner removed it meanwhile.
  pub fn acquire(dir: &Path) -> Result<Self, WorkspaceError> {
    let lock_path = dir.join(LOCK_FILENAME);
    let lock_err = |source| WorkspaceError::Lock {
      path: lock_path.clone(),
      source,
    };

    for _ in 0..ACQUIRE_ATTEMPTS {
      let file = match OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
      {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
          fs::create_dir_all(dir).map_err(|source| WorkspaceError::Create {
            path: dir.to_path_buf(),
            source,
          })?;
          continue;
        }
        Err(source) => return Err(lock_err(source)),
      };

      if let Err(err) = try_lock(&file) {
        if err.kind() == io::ErrorKind::WouldBlock {
          return Err(WorkspaceError::InUse {
            dir: dir.to_path_buf(),
            pid: read_owner(&lock_path),
          });
        }
        return Err(lock_err(err));
      }

      // The previous owner may have unlinked the file between our open and lock.
      if !still_linked(&file, &lock_path).map_err(lock_err)? {
        debug!(path = %lock_path.display(), "lock file was replaced, retrying");
        continue;
      }

      write_metadata(&file).map_err(lock_err)?;
      return Ok(WorkspaceLock { _file: file, lock_path });
    }

    Err(lock_err(io::Error::other("lock file kept being replaced")))
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }

  /// Delete the lock file and give up the claim.
  ///
  /// On unix the file is unlinked while still locked, so a concurrent claimant
  /// either sees it locked or sees it gone.
  pub fn remove(self) -> io::Result<()> {
    #[cfg(unix)]
    {
      let removed = fs::remove_file(&self.lock_path);
      drop(self);
      removed
    }
    #[cfg(windows)]
    {
      let lock_path = self.lock_path.clone();
      drop(self);
      fs::remove_file(lock_path)
    }
  }
}

/// Whether `path` still names the open `file`.
#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> io::Result<bool> {
  use std::os::unix::fs::MetadataExt;

  let held = file.metadata()?;
  match fs::metadata(path) {
    Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
    Err(e) => Err(e),
  }
}

/// Open files cannot be deleted on windows, so a locked file is always linked.
#[cfg(windows)]
fn still_linked(_file: &File, _path: &Path) -> io::Result<bool> {
  Ok(true)
}

fn write_metadata(file: &File) -> io::Result<()> {
  let metadata = LockMetadata {
    pid: std::process::id(),
    started_at_unix: SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs(),
  };

  file.set_len(0)?;
  let mut writer = io::BufWriter::new(file);
  serde_json::to_writer(&mut writer, &metadata).map_err(io::Error::other)?;
  writer.flush()
}

fn read_owner(lock_path: &Path) -> Option<u32> {
  let mut contents = String::new();
  File::open(lock_path).ok()?.read_to_string(&mut contents).ok()?;
  serde_json::from_str::<LockMetadata>(&contents).ok().map(|m| m.pid)
}

#[cfg(unix)]
fn try_lock(file: &File) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive)
    .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock(file: &File) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;

  // SAFETY: OVERLAPPED is a plain data struct that is valid when zero-initialized.
  // LockFileEx is safe to call with a valid file handle and zeroed OVERLAPPED.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(
      handle,
      LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
      0,
      1,
      0,
      &mut overlapped,
    )
  };

  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}
