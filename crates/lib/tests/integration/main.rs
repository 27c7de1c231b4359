//! Integration tests for gaia-lib.
//!
//! Builds run end to end against a fake `go` script that records every
//! invocation, so no real toolchain or network access is needed.

#![cfg(unix)]

mod build_tests;
mod cancel_tests;
mod common;
