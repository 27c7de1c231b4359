//! Shared helpers for library integration tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use gaia_lib::metadata::{RemoteError, TagLookup, VcsError, VersionControl};
use gaia_lib::{Builder, BuilderConfig};
use tempfile::TempDir;

/// Pseudo-version reported for the base program, so no tag lookup is needed.
pub const BASE_VERSION: &str = "v0.0.0-20240501123000-4bbe83eec0a4";

/// A fake toolchain.
///
/// The script appends one line per invocation to `calls.log`. `go get` of a
/// coordinate containing `slow` blocks for 30 seconds; `go mod edit -json`
/// prints `gomod.json` from the module file's directory.
pub struct FakeGo {
  pub temp: TempDir,
  pub go: PathBuf,
  log: PathBuf,
}

impl FakeGo {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let log = temp.path().join("calls.log");
    let go = temp.path().join("go");

    let script = format!(
      r#"#!/bin/sh
LOG='{log}'
echo "$* | GOOS=$GOOS GOARCH=$GOARCH GOPATH=$GOPATH" >> "$LOG"
case "$1" in
  env)
    echo '{{"GOPATH": "/tmp/fake-gopath", "GOMODCACHE": "", "GOCACHE": "/tmp/fake-gocache", "GOOS": "linux", "GOARCH": "amd64"}}'
    ;;
  version)
    echo "go version go1.22.4 linux/amd64"
    ;;
  list)
    echo '{{"Path": "github.com/cs3org/reva", "Version": "{version}"}}'
    ;;
  get)
    case "$2" in
      *slow*) exec sleep 30 ;;
    esac
    ;;
  mod)
    case "$2 $3" in
      "init "*) echo "module $3" > go.mod ;;
      "edit -json") cat "$(dirname "$4")/gomod.json" ;;
    esac
    ;;
  build)
    printf '#!/bin/sh\necho revad\n' > "$3"
    chmod +x "$3"
    cp main.go "$3.main.go"
    ;;
esac
"#,
      log = log.display(),
      version = BASE_VERSION,
    );
    std::fs::write(&go, script).unwrap();
    std::fs::set_permissions(&go, std::fs::Permissions::from_mode(0o755)).unwrap();

    Self { temp, go, log }
  }

  /// Logged invocations, arguments only.
  pub fn calls(&self) -> Vec<String> {
    self
      .log_lines()
      .iter()
      .map(|line| line.split(" | ").next().unwrap_or_default().to_string())
      .collect()
  }

  /// Full log lines, including the environment seen by each command.
  pub fn log_lines(&self) -> Vec<String> {
    std::fs::read_to_string(&self.log)
      .unwrap_or_default()
      .lines()
      .map(str::to_string)
      .collect()
  }

  pub fn config(&self) -> BuilderConfig {
    BuilderConfig {
      toolchain: self.go.clone(),
      ..BuilderConfig::default()
    }
  }

  pub fn builder(&self) -> Builder<FakeVcs, NoTags> {
    self.builder_with(self.config())
  }

  pub fn builder_with(&self, config: BuilderConfig) -> Builder<FakeVcs, NoTags> {
    Builder::with_collaborators(config, FakeVcs, NoTags)
  }

  /// Path inside the fake's temp directory.
  pub fn path(&self, name: &str) -> PathBuf {
    self.temp.path().join(name)
  }
}

/// Local checkouts always describe as a fixed revision.
#[derive(Clone)]
pub struct FakeVcs;

impl VersionControl for FakeVcs {
  fn describe(&self, _path: &Path) -> Result<String, VcsError> {
    Ok("v1.28.0-3-g4bbe83e".to_string())
  }

  fn short_commit(&self, _path: &Path) -> Result<String, VcsError> {
    Ok("4bbe83e".to_string())
  }
}

/// Tag lookup that must never be reached.
pub struct NoTags;

impl TagLookup for NoTags {
  async fn tag_commit(&self, tag: &str) -> Result<String, RemoteError> {
    panic!("unexpected tag lookup for {}", tag);
  }
}
