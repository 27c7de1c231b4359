//! Test utilities for gaia-lib.
//!
//! Toolchain behavior is exercised against small shell scripts standing in
//! for the real `go` binary.

use std::path::{Path, PathBuf};

/// Write an executable `/bin/sh` script named `name` into `dir`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  let path = dir.join(name);
  std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
  std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
  path
}
