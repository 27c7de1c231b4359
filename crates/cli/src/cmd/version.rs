//! Implementation of the `gaia version` command.

use anyhow::Result;
use gaia_lib::consts::{BASE_COORDINATE, DEFAULT_TOOLCHAIN};

use crate::output::{print_json, print_stat};

pub fn cmd_version(json: bool) -> Result<()> {
  let version = env!("CARGO_PKG_VERSION");
  if json {
    return print_json(&serde_json::json!({
      "version": version,
      "base": BASE_COORDINATE,
      "toolchain": DEFAULT_TOOLCHAIN,
    }));
  }

  println!("gaia {}", version);
  print_stat("Base", BASE_COORDINATE);
  print_stat("Toolchain", DEFAULT_TOOLCHAIN);
  Ok(())
}
