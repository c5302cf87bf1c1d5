//! ## Features
//!
//! - Standard logging levels (info, warn, error, debug, verbose) routed through `tracing`
//! - Multi-line message support with one event per line
//! - Colored console confirmations (success, fail) for interactive tools
//! - A single `init` that installs the `tracing-subscriber` pipeline
//!
//! ## Usage
//!
//! Call `bentley::init(verbose)` once from a binary, then use `info()`, `warn()`, `error()`,
//! `debug()`, `verbose()` or the matching macros anywhere in library code.

use colored::*;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "sqlpilot=info,bentley=info,warn";
const VERBOSE_FILTER: &str = "sqlpilot=debug,bentley=trace,reqwest=info,info";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the built-in filters when it is set. Calling this more than once is
/// harmless; later calls leave the first subscriber in place.
pub fn init(verbose: bool) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    if verbose {
      EnvFilter::new(VERBOSE_FILTER)
    } else {
      EnvFilter::new(DEFAULT_FILTER)
    }
  });

  let _ = tracing_subscriber::registry()
    .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
    .with(filter)
    .try_init();
}

/// Format a colored prefix for console messages
fn format_prefix(color: Color, prefix: &str) -> String {
  format!("[{}]{:<width$}", prefix.color(color).bold(), "", width = 7 - prefix.len() - 2)
}

/// Write a message straight to stderr, one line at a time
pub fn log(message: &str) {
  for line in message.lines() {
    eprintln!("{line}");
  }
}

pub fn verbose(message: &str) {
  for line in message.lines() {
    tracing::trace!(target: "bentley", "{line}");
  }
}

/// Info level logging - general information
pub fn info(message: &str) {
  for line in message.lines() {
    tracing::info!(target: "bentley", "{line}");
  }
}

/// Warning level logging - something needs attention
pub fn warn(message: &str) {
  for line in message.lines() {
    tracing::warn!(target: "bentley", "{line}");
  }
}

/// Error level logging - something went wrong
pub fn error(message: &str) {
  for line in message.lines() {
    tracing::error!(target: "bentley", "{line}");
  }
}

/// Debug level logging - detailed diagnostic information
pub fn debug(message: &str) {
  for line in message.lines() {
    tracing::debug!(target: "bentley", "{line}");
  }
}

/// Console confirmation that something completed successfully
pub fn success(message: &str) {
  let prefix = format_prefix(Color::Green, "sccs");
  for line in message.lines() {
    log(&format!("{prefix} {line}"));
  }
}

/// Console notice that a user-facing operation failed
pub fn fail(message: &str) {
  let prefix = format_prefix(Color::BrightRed, "fail");
  for line in message.lines() {
    log(&format!("{prefix} {line}"));
  }
}

/// Macros for coverage-excluded logging - these expand with LCOV_EXCL_LINE at call sites
#[macro_export]
macro_rules! info {
  ($msg:expr) => {
    $crate::info($msg); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! warn {
  ($msg:expr) => {
    $crate::warn($msg); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! error {
  ($msg:expr) => {
    $crate::error($msg); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! verbose {
  ($msg:expr) => {
    $crate::verbose($msg); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! debug {
  ($msg:expr) => {
    $crate::debug($msg); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! success {
  ($msg:expr) => {
    $crate::success($msg); // LCOV_EXCL_LINE
  };
}

#[macro_export]
macro_rules! fail {
  ($msg:expr) => {
    $crate::fail($msg); // LCOV_EXCL_LINE
  };
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn prefix_pads_short_labels() {
    colored::control::set_override(false);
    assert_eq!(format_prefix(Color::Green, "sccs"), "[sccs] ");
    assert_eq!(format_prefix(Color::Red, "fail"), "[fail] ");
    colored::control::unset_override();
  }
}
