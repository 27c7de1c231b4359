//! Compiler and linker argument assembly.

use thiserror::Error;

use crate::metadata::BuildMetadata;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgsError {
  #[error("value for '{name}' contains a single quote: {value}")]
  UnquotableValue { name: String, value: String },
}

/// Ordered mapping of flag names to value fragments.
///
/// Fragments added under an existing flag are appended to it, so each flag
/// appears once, at the position of its first `add`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildArgs {
  flags: Vec<(String, Vec<String>)>,
}

impl BuildArgs {
  pub fn new() -> Self {
    Self::default()
  }

  /// Arguments for a debug or release build.
  ///
  /// Debug builds disable optimizations and inlining; release builds trim
  /// file system paths and strip symbol tables.
  pub fn for_mode(debug: bool) -> Self {
    let mut args = Self::new();
    if debug {
      args.add("-gcflags", ["all=-N -l"]);
    } else {
      args.add("-trimpath", [""]);
      args.add("-ldflags", ["-w", "-s"]);
    }
    args
  }

  pub fn add<I, S>(&mut self, flag: &str, values: I) -> &mut Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let values = values.into_iter().map(Into::into);
    match self.flags.iter_mut().find(|(name, _)| name == flag) {
      Some((_, existing)) => existing.extend(values),
      None => self.flags.push((flag.to_string(), values.collect())),
    }
    self
  }

  /// Add `-tags a,b,c` when `tags` is non-empty.
  pub fn add_tags(&mut self, tags: &[String]) -> &mut Self {
    if !tags.is_empty() {
      self.add("-tags", [tags.join(",")]);
    }
    self
  }

  /// Embed build metadata into variables of `entry_package` at link time.
  pub fn add_metadata(&mut self, entry_package: &str, metadata: &BuildMetadata) -> Result<&mut Self, ArgsError> {
    let fields = metadata_ldflags(entry_package, metadata)?;
    Ok(self.add("-ldflags", fields))
  }

  /// Render as an argument sequence: each flag, then its joined value if any.
  pub fn format(&self) -> Vec<String> {
    let mut args = Vec::with_capacity(self.flags.len() * 2);
    for (name, values) in &self.flags {
      args.push(name.clone());
      let joined = values
        .iter()
        .filter(|v| !v.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");
      if !joined.is_empty() {
        args.push(joined);
      }
    }
    args
  }
}

/// `-X '<package>.<name>=<value>'` fragments for every set metadata field.
pub fn metadata_ldflags(entry_package: &str, metadata: &BuildMetadata) -> Result<Vec<String>, ArgsError> {
  let mut fragments = Vec::new();
  for (name, value) in metadata.fields() {
    if value.is_empty() {
      continue;
    }
    if value.contains('\'') {
      return Err(ArgsError::UnquotableValue {
        name: name.to_string(),
        value,
      });
    }
    fragments.push(format!("-X '{}.{}={}'", entry_package, name, value));
  }
  Ok(fragments)
}
