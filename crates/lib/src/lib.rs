//! gaia-lib: composed custom builds of a base program.
//!
//! This crate drives the Go toolchain to produce an executable made of a base
//! program plus a caller-selected set of plugin modules:
//! - `Workspace`: isolated build directory and environment overlay
//! - `ModuleGraph`: modules to fetch and replace directives to apply
//! - `entrypoint`: the synthesized `main.go` importing every plugin
//! - `BuildMetadata`: version, commit, toolchain version and build date
//! - `BuildArgs`: ordered compiler and linker arguments
//! - `Builder`: the single `build(spec) -> path` entry point

pub mod args;
pub mod builder;
pub mod config;
pub mod consts;
pub mod context;
pub mod entrypoint;
pub mod graph;
pub mod metadata;
pub mod spec;
pub mod template;
pub mod toolchain;
pub mod workspace;

#[cfg(test)]
mod util;

pub use builder::{BuildError, BuildStage, Builder, ErrorKind};
pub use config::{BaseProgram, BuilderConfig};
pub use spec::{BuildSpec, Platform, PluginReference, ReplaceDirective};
