//! CLI smoke tests for gaia.
//!
//! These tests verify that the commands parse their arguments, report errors
//! with a failing exit code, and drive a build end to end against a fake
//! toolchain.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a Command for the gaia binary.
fn gaia_cmd() -> Command {
  let mut cmd = cargo_bin_cmd!("gaia");
  cmd.env_remove("RUST_LOG");
  cmd
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  gaia_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  gaia_cmd()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("gaia"));
}

#[test]
fn subcommand_help_works() {
  for cmd in &["build", "version"] {
    gaia_cmd()
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

#[test]
fn version_command_prints_base() {
  gaia_cmd()
    .arg("version")
    .assert()
    .success()
    .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")))
    .stdout(predicate::str::contains("github.com/cs3org/reva"));
}

#[test]
fn version_command_json() {
  let output = gaia_cmd().args(["version", "--json"]).output().unwrap();
  assert!(output.status.success());
  let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
}

// =============================================================================
// Build errors
// =============================================================================

#[test]
fn build_rejects_empty_output() {
  gaia_cmd()
    .args(["build", "--output", ""])
    .env("GAIA_GO", "/nonexistent/go")
    .assert()
    .failure()
    .stderr(predicate::str::contains("output"));
}

#[test]
fn build_rejects_malformed_with() {
  gaia_cmd()
    .args(["build", "--with", "example.org/plugin@"])
    .env("GAIA_GO", "/nonexistent/go")
    .assert()
    .failure()
    .stderr(predicate::str::contains("Invalid --with entry"));
}

#[test]
fn build_reports_missing_toolchain() {
  let temp = TempDir::new().unwrap();
  gaia_cmd()
    .args(["build", "--output"])
    .arg(temp.path().join("revad"))
    .env("GAIA_GO", "/nonexistent/go")
    .assert()
    .failure()
    .stderr(predicate::str::contains("Build failed"));
  assert!(!temp.path().join("revad").exists());
}

#[test]
fn build_rejects_missing_config_file() {
  gaia_cmd()
    .args(["build", "--config", "/nonexistent/gaia.toml"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to read config file"));
}

// =============================================================================
// End to end
// =============================================================================

#[cfg(unix)]
fn fake_go(dir: &std::path::Path) -> std::path::PathBuf {
  use std::os::unix::fs::PermissionsExt;

  let go = dir.join("go");
  let script = r#"#!/bin/sh
case "$1" in
  env) echo '{"GOPATH": "/tmp/gopath", "GOOS": "linux", "GOARCH": "amd64"}' ;;
  version) echo "go version go1.22.4 linux/amd64" ;;
  list) echo '{"Path": "github.com/cs3org/reva", "Version": "v0.0.0-20240501123000-4bbe83eec0a4"}' ;;
  build) printf '#!/bin/sh\necho revad\n' > "$3" ;;
esac
"#;
  std::fs::write(&go, script).unwrap();
  std::fs::set_permissions(&go, std::fs::Permissions::from_mode(0o755)).unwrap();
  go
}

#[cfg(unix)]
#[test]
fn build_with_fake_toolchain() {
  let temp = TempDir::new().unwrap();
  let go = fake_go(temp.path());
  let output = temp.path().join("bin-revad");

  gaia_cmd()
    .args(["build", "v1.28.0", "--with", "example.org/plugin", "--output"])
    .arg(&output)
    .env("GAIA_GO", &go)
    .assert()
    .success()
    .stdout(predicate::str::contains("Built"))
    .stdout(predicate::str::contains("v1.28.0"));

  assert!(output.is_file());
}

#[cfg(unix)]
#[test]
fn config_file_selects_toolchain() {
  let temp = TempDir::new().unwrap();
  let go = fake_go(temp.path());
  let config = temp.path().join("gaia.toml");
  std::fs::write(&config, format!("toolchain = {:?}\n", go.display().to_string())).unwrap();
  let output = temp.path().join("revad");

  gaia_cmd()
    .args(["build", "--config"])
    .arg(&config)
    .arg("--output")
    .arg(&output)
    .env_remove("GAIA_GO")
    .assert()
    .success();

  assert!(output.is_file());
}
