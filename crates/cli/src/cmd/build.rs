//! Implementation of the `gaia build` command.
//!
//! Composes revad with the requested plugins and compiles it with the Go
//! toolchain.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use gaia_lib::consts::DEFAULT_VERSION;
use gaia_lib::{BuildSpec, Builder, BuilderConfig, Platform};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::output::{format_duration, print_stat, print_success};

#[derive(Debug, Args)]
pub struct BuildOptions {
  /// Version of the base program to build
  #[arg(default_value = DEFAULT_VERSION)]
  pub version: String,

  /// Plugin to include, as MODULE[@VERSION][=REPLACEMENT[@VERSION]];
  /// repeat the flag or separate entries with commas
  #[arg(long = "with", value_name = "MODULE", value_delimiter = ',')]
  pub with: Vec<String>,

  /// Path of the produced binary
  #[arg(short, long, default_value = "./revad")]
  pub output: PathBuf,

  /// Build without optimizations, keeping debug symbols
  #[arg(short, long)]
  pub debug: bool,

  /// Keep the workspace after the build
  #[arg(short = 'l', long)]
  pub leave_workspace: bool,

  /// Build tags, comma separated
  #[arg(long, value_delimiter = ',')]
  pub tags: Vec<String>,

  /// Use this directory as workspace instead of a temporary one
  #[arg(long, value_name = "DIR")]
  pub workspace: Option<PathBuf>,

  /// Target operating system (defaults to the toolchain's GOOS)
  #[arg(long)]
  pub os: Option<String>,

  /// Target architecture (defaults to the toolchain's GOARCH)
  #[arg(long)]
  pub arch: Option<String>,

  /// Abort the build after this long (e.g. "2m", "90s")
  #[arg(long, value_parser = humantime::parse_duration)]
  pub timeout: Option<Duration>,
}

impl BuildOptions {
  pub fn to_spec(&self) -> Result<BuildSpec> {
    let mut spec = BuildSpec::new(&self.output)
      .with_entries(&self.with)
      .context("Invalid --with entry")?;
    spec.base_version = self.version.clone();
    spec.platform = Platform {
      os: self.os.clone(),
      arch: self.arch.clone(),
    };
    spec.debug = self.debug;
    spec.tags = self.tags.clone();
    spec.workspace_dir = self.workspace.clone();
    spec.leave_workspace = self.leave_workspace;
    Ok(spec)
  }
}

pub fn cmd_build(options: BuildOptions, mut config: BuilderConfig) -> Result<()> {
  let spec = options.to_spec()?;
  if let Some(timeout) = options.timeout {
    config = config.with_build_timeout(timeout);
  }

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let started = Instant::now();
  let path = rt.block_on(async {
    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupted, stopping build");
        interrupt.cancel();
      }
    });

    Builder::new(config).build(&spec, token).await
  });
  let path = path.context("Build failed")?;

  print_success(&format!("Built {}", path.display()));
  print_stat("Version", &spec.base_version);
  print_stat("Plugins", &spec.plugins.len().to_string());
  print_stat("Took", &format_duration(started.elapsed()));
  Ok(())
}
