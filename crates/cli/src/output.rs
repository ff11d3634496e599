//! CLI output: one JSON line per build file on stdout, a summary on stderr.

use anyhow::Context;
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;
use trellis_lib::Entry;
use trellis_lib::diagnostics::{Diagnostic, Diagnostics};

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
}

/// Outcome of evaluating one build file.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Report {
  Success {
    path: String,
    values: Vec<Entry>,
    diagnostics: Vec<Diagnostic>,
  },
  Failure {
    path: String,
    error: String,
  },
}

impl Report {
  pub fn success(path: String, values: Vec<Entry>, diagnostics: Diagnostics) -> Self {
    Report::Success {
      path,
      values,
      diagnostics: diagnostics.into_iter().collect(),
    }
  }

  pub fn failure(path: String, error: String) -> Self {
    Report::Failure { path, error }
  }

  pub fn is_failure(&self) -> bool {
    matches!(self, Report::Failure { .. })
  }
}

pub fn print_report(report: &Report) -> anyhow::Result<()> {
  let line = serde_json::to_string(report).context("Failed to serialize report")?;
  println!("{line}");
  if let Report::Failure { path, error } = report {
    print_error(&format!("{path}: {error}"));
  }
  Ok(())
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_summary(total: usize, failures: usize) {
  if failures == 0 {
    eprintln!(
      "{} Evaluated {} build file(s)",
      symbols::SUCCESS.if_supports_color(Stream::Stderr, |s| s.green()),
      total
    );
  } else {
    print_error(&format!("{failures} of {total} build file(s) failed"));
  }
}
