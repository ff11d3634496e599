//! Diagnostics collected while evaluating a build file.
//!
//! A diagnostic reports a degraded but recoverable condition, such as a glob
//! service failure that was answered by a filesystem scan instead. Diagnostics
//! never fail an evaluation on their own; they are handed back to the caller
//! alongside the evaluation result.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

/// Severity of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
  Warning,
  Error,
}

impl DiagnosticLevel {
  pub fn as_str(self) -> &'static str {
    match self {
      DiagnosticLevel::Warning => "warning",
      DiagnosticLevel::Error => "error",
    }
  }
}

impl fmt::Display for DiagnosticLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A message and its severity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Diagnostic {
  pub message: String,
  pub level: DiagnosticLevel,
}

impl Diagnostic {
  pub fn new(message: impl Into<String>, level: DiagnosticLevel) -> Self {
    Diagnostic {
      message: message.into(),
      level,
    }
  }

  pub fn warning(message: impl Into<String>) -> Self {
    Diagnostic::new(message, DiagnosticLevel::Warning)
  }

  pub fn error(message: impl Into<String>) -> Self {
    Diagnostic::new(message, DiagnosticLevel::Error)
  }
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.level, self.message)
  }
}

/// The diagnostics of one evaluation. Duplicates collapse.
pub type Diagnostics = BTreeSet<Diagnostic>;
