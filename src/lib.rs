//! Project-oriented process supervision daemon for Unix.

#![warn(unused_crate_dependencies)]
// These dependencies are only used in the binary (src/bin/main.rs)
// Test dependencies are only used in test code
#[cfg(test)]
use assert_cmd as _;
#[cfg(test)]
use predicates as _;
use tracing_subscriber as _;

/// CLI parsing.
pub mod cli;

/// Constants.
pub mod constants;

/// Filesystem-backed driver.
pub mod driver;

/// Errors.
pub mod error;

/// Concurrent project registry.
pub mod manager;

/// Bounded-queue thread pool.
pub mod pool;

/// Child process launch and termination.
pub mod process;

/// Command protocol dispatcher.
pub mod protocol;

/// Unix-socket request server.
pub mod server;

/// Signal handling.
pub mod signals;

/// Project and service settings.
pub mod settings;
