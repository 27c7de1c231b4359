mod cmd;
mod config;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::output::print_error;

/// gaia - build custom revad binaries with plugins
#[derive(Parser)]
#[command(name = "gaia")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Increase log verbosity (-v debug, -vv trace)
  #[arg(short, long, global = true, action = ArgAction::Count)]
  verbose: u8,

  /// Builder configuration file (TOML)
  #[arg(long, global = true, value_name = "FILE")]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build revad with the given plugins
  Build(cmd::BuildOptions),

  /// Print version information
  Version {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
}

fn init_tracing(verbose: u8) {
  let level = match verbose {
    0 => "info",
    1 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .with_target(verbose > 0)
    .init();
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let result = match cli.command {
    Commands::Build(options) => {
      config::load(cli.config.as_deref()).and_then(|config| cmd::cmd_build(options, config))
    }
    Commands::Version { json } => cmd::cmd_version(json),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_error(&format!("{:#}", err));
      ExitCode::FAILURE
    }
  }
}
