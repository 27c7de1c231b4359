//! Module graph composition.
//!
//! Decides which modules get fetched and which replace directives end up in
//! the workspace's module file. When the base program is replaced by a
//! checkout on disk, that checkout's own replace directives are inherited so
//! the composed program resolves the same dependency graph it would.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::BaseProgram;
use crate::context::{BuildContext, Interrupt};
use crate::spec::{BuildSpec, ReplaceDirective};
use crate::toolchain::{ModuleFetch, ModuleIntrospector};

/// Modules to fetch and replace directives to apply, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleGraph {
  pub fetch: Vec<ModuleFetch>,
  pub replaces: Vec<ReplaceDirective>,
  /// Local checkout standing in for the base program.
  pub local_override: Option<PathBuf>,
}

/// Compose the module graph for `spec`.
///
/// Fetches are the plugins in input order, each coordinate once, followed by
/// the base program at `spec.base_version`. Replace directives are the
/// spec's, in input order, followed by those inherited from a local override.
///
/// A failure to read the override's module file is logged and composition
/// continues without inherited directives. Only an interrupt aborts.
pub async fn compose<I: ModuleIntrospector>(
  spec: &BuildSpec,
  base: &BaseProgram,
  introspector: &I,
  ctx: &BuildContext,
) -> Result<ModuleGraph, Interrupt> {
  let mut seen = HashSet::new();
  let mut fetch: Vec<ModuleFetch> = spec
    .plugins
    .iter()
    .filter(|plugin| seen.insert(plugin.coordinate.as_str()))
    .map(|plugin| ModuleFetch {
      coordinate: plugin.coordinate.clone(),
      version: plugin.version.clone(),
    })
    .collect();
  fetch.push(ModuleFetch {
    coordinate: base.coordinate.clone(),
    version: Some(spec.base_version.clone()),
  });

  let mut replaces: Vec<ReplaceDirective> = spec.replacements.iter().map(resolve_local_target).collect();

  let local_override = find_local_override(&replaces, &base.coordinate);
  if let Some(path) = &local_override {
    debug!(path = %path.display(), "base program replaced by local checkout");
    match introspector.replace_directives(path, ctx).await {
      Ok(inherited) => {
        for replace in inherited {
          let replace = inherit_from(path, replace);
          debug!(replace = %replace, "inherited replace from local base program");
          replaces.push(replace);
        }
      }
      Err(err) => {
        if let Some(interrupt) = err.interrupt() {
          return Err(interrupt);
        }
        warn!(path = %path.display(), error = %err, "could not read replace directives of local base program");
      }
    }
  }

  Ok(ModuleGraph {
    fetch,
    replaces,
    local_override,
  })
}

/// The local checkout replacing the base program, if any.
///
/// This is the target of the first directive whose `from` is the base
/// coordinate and whose target is a filesystem path (absolute, or starting
/// with `./` or `../`) that exists. A bare relative target such as
/// `example.org/fork` names a module, even if a directory of that name
/// happens to exist in the working directory.
pub fn find_local_override(replaces: &[ReplaceDirective], base_coordinate: &str) -> Option<PathBuf> {
  replaces
    .iter()
    .filter(|r| r.from == base_coordinate && r.to_version.is_none())
    .filter(|r| is_relative_local(&r.to) || Path::new(&r.to).is_absolute())
    .map(|r| Path::new(&r.to))
    .find(|path| path.exists())
    .map(Path::to_path_buf)
}

fn is_relative_local(target: &str) -> bool {
  target.starts_with("./") || target.starts_with("../") || target == "." || target == ".."
}

/// Relative local targets are relative to the caller, not to the workspace
/// the toolchain runs in.
fn resolve_local_target(replace: &ReplaceDirective) -> ReplaceDirective {
  let mut replace = replace.clone();
  if is_relative_local(&replace.to) {
    if let Ok(absolute) = std::path::absolute(&replace.to) {
      replace.to = absolute.to_string_lossy().into_owned();
    }
  }
  replace
}

/// Relative targets in the override's module file are relative to the override.
fn inherit_from(override_dir: &Path, mut replace: ReplaceDirective) -> ReplaceDirective {
  if is_relative_local(&replace.to) {
    replace.to = override_dir.join(&replace.to).to_string_lossy().into_owned();
  }
  replace
}
