//! Synthesis of the composed program's entry file.
//!
//! The entry file imports the base program's entry package and blank-imports
//! every plugin so that their load-time registration runs before `Main`.

use std::sync::LazyLock;

use thiserror::Error;

use crate::config::BaseProgram;
use crate::spec::{PluginReference, SpecError, validate_coordinate};
use crate::template::{Context, Template, TemplateError};

const MAIN_TEMPLATE: &str = "package main

import (
\tbasecmd $${base}
$${each:plugins}\t_ $${item}
$${end})

func main() {
\tbasecmd.Main()
}
";

static MAIN: LazyLock<Result<Template, TemplateError>> = LazyLock::new(|| Template::parse(MAIN_TEMPLATE));

/// Errors that can occur while rendering the entry file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntrypointError {
  #[error(transparent)]
  Coordinate(#[from] SpecError),

  #[error("entry template error: {0}")]
  Template(#[from] TemplateError),
}

/// Render the entry source for `plugins`.
///
/// Plugins whose coordinate equals the base program's are skipped; the rest
/// are imported in input order, each coordinate once.
pub fn render(base: &BaseProgram, plugins: &[PluginReference]) -> Result<String, EntrypointError> {
  let template = MAIN.as_ref().map_err(Clone::clone)?;

  let mut imports: Vec<String> = Vec::with_capacity(plugins.len());
  for plugin in import_list(base, plugins) {
    imports.push(quote(&plugin.coordinate)?);
  }

  let mut ctx = Context::default();
  ctx.value("base", quote(&base.entry_package)?).list("plugins", imports);

  Ok(template.render(&ctx)?)
}

/// Plugins that get a side-effect import, in input order.
pub fn import_list<'a>(base: &BaseProgram, plugins: &'a [PluginReference]) -> Vec<&'a PluginReference> {
  let mut seen = std::collections::HashSet::new();
  plugins
    .iter()
    .filter(|p| p.coordinate != base.coordinate)
    .filter(|p| seen.insert(p.coordinate.as_str()))
    .collect()
}

/// Quote a validated coordinate as a Go string literal.
fn quote(coordinate: &str) -> Result<String, SpecError> {
  validate_coordinate(coordinate)?;
  Ok(format!("\"{}\"", coordinate))
}
