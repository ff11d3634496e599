//! Error types for build file evaluation.
//!
//! Two layers exist. [`BuiltinError`] is raised from inside Lua by the engine's
//! builtins and metamethods; it travels through the Lua stack wrapped in
//! [`LuaError::ExternalError`]. [`EvalError`] is what [`crate::engine::Engine::process`]
//! returns: either a recognised builtin failure, dug back out of the nested
//! mlua callback errors, or the Lua failure verbatim.

use std::path::{Path, PathBuf};

use mlua::prelude::*;

/// Failures raised by the engine while build file code is running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuiltinError {
  /// The name is not visible from the running scope. Private and
  /// non-exported include symbols fail the same way.
  #[error("name '{name}' is not defined")]
  UnboundSymbol { name: String },

  #[error("glob {patterns:?} in '{}' matched no files", .dir.display())]
  EmptyGlob { patterns: Vec<String>, dir: PathBuf },

  #[error("invalid glob pattern '{pattern}': {reason}")]
  InvalidGlobPattern { pattern: String, reason: String },

  #[error("invalid path '{path}': {reason}")]
  InvalidPath { path: String, reason: &'static str },

  #[error("include cycle: {}", format_chain(.chain))]
  IncludeCycle { chain: Vec<PathBuf> },

  #[error("duplicate rule definition '{name}'")]
  DuplicateRule { name: String },

  #[error("rules must contain the field 'name'")]
  MissingRuleName,

  #[error("invalid value for rule field '{field}': {reason}")]
  InvalidRuleValue { field: String, reason: String },

  #[error("cannot use `{function}()` at the top level of an included file")]
  NotInBuildFile { function: &'static str },

  #[error("build environment passed to add_rule() belongs to another build file")]
  StaleBuildEnv,

  #[error("cannot read '{}': {message}", .path.display())]
  Read { path: PathBuf, message: String },
}

fn format_chain(chain: &[PathBuf]) -> String {
  chain
    .iter()
    .map(|p| p.display().to_string())
    .collect::<Vec<_>>()
    .join(" -> ")
}

impl From<BuiltinError> for LuaError {
  fn from(err: BuiltinError) -> Self {
    LuaError::external(err)
  }
}

/// Errors returned by [`crate::engine::Engine`].
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
  /// An engine builtin rejected the build file.
  #[error("{}: {source}", .build_file.display())]
  Builtin {
    build_file: PathBuf,
    #[source]
    source: BuiltinError,
    /// Lua traceback of the failing call, for file and line attribution.
    traceback: Option<String>,
  },

  /// Any other Lua failure, including errors raised by the build file itself.
  #[error("{}: {source}", .build_file.display())]
  Script {
    build_file: PathBuf,
    #[source]
    source: LuaError,
  },

  #[error("build file not found: {}", .0.display())]
  NotFound(PathBuf),

  #[error("invalid project root {}: {source}", .path.display())]
  ProjectRoot {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to initialize lua runtime: {0}")]
  Runtime(#[from] LuaError),
}

impl EvalError {
  /// Classify a Lua failure raised while evaluating `build_file`.
  pub fn from_lua(build_file: &Path, err: LuaError) -> Self {
    match find_builtin_error(&err) {
      Some((source, traceback)) => EvalError::Builtin {
        build_file: build_file.to_path_buf(),
        source: source.clone(),
        traceback,
      },
      None => EvalError::Script {
        build_file: build_file.to_path_buf(),
        source: err,
      },
    }
  }

  /// The typed builtin failure, if this is one.
  pub fn builtin(&self) -> Option<&BuiltinError> {
    match self {
      EvalError::Builtin { source, .. } => Some(source),
      _ => None,
    }
  }

  pub fn traceback(&self) -> Option<&str> {
    match self {
      EvalError::Builtin { traceback, .. } => traceback.as_deref(),
      _ => None,
    }
  }
}

/// Walk nested callback errors down to a [`BuiltinError`], keeping the
/// innermost traceback.
fn find_builtin_error(err: &LuaError) -> Option<(&BuiltinError, Option<String>)> {
  match err {
    LuaError::CallbackError { traceback, cause } => {
      find_builtin_error(cause).map(|(found, inner)| (found, inner.or_else(|| Some(traceback.clone()))))
    }
    LuaError::WithContext { cause, .. } => find_builtin_error(cause),
    LuaError::ExternalError(inner) => match inner.downcast_ref::<BuiltinError>() {
      Some(found) => Some((found, None)),
      None => inner.downcast_ref::<LuaError>().and_then(find_builtin_error),
    },
    _ => None,
  }
}
