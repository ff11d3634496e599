//! Project path helpers.
//!
//! Build files name other files with project paths: `//defs/java` refers to
//! `<project root>/defs/java`. Absolute paths are accepted as well. Both are
//! normalized lexically so that the same file always yields the same key.

use std::path::{Component, Path, PathBuf};

use crate::error::BuiltinError;

/// Prefix marking a path relative to the project root.
pub const PROJECT_PREFIX: &str = "//";

/// Resolve a `//`-prefixed or absolute path to a normalized absolute path.
pub fn resolve_project_path(project_root: &Path, spec: &str) -> Result<PathBuf, BuiltinError> {
  let path = if let Some(relative) = spec.strip_prefix(PROJECT_PREFIX) {
    project_root.join(relative)
  } else if Path::new(spec).is_absolute() {
    PathBuf::from(spec)
  } else {
    return Err(BuiltinError::InvalidPath {
      path: spec.to_string(),
      reason: "expected a path starting with '//' or an absolute path",
    });
  };
  Ok(normalize(&path))
}

/// Remove `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
  let mut normalized = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        normalized.pop();
      }
      other => normalized.push(other.as_os_str()),
    }
  }
  normalized
}

/// Join path components with `/`, independent of the host separator.
pub fn to_slash(path: &Path) -> String {
  path
    .components()
    .filter_map(|c| match c {
      Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
      _ => None,
    })
    .collect::<Vec<_>>()
    .join("/")
}

/// Directory of `build_file` relative to `project_root`, `""` at the root.
pub fn base_path(project_root: &Path, build_file: &Path) -> String {
  build_file
    .parent()
    .and_then(|dir| dir.strip_prefix(project_root).ok())
    .map(to_slash)
    .unwrap_or_default()
}

/// Chunk name for Lua error messages and tracebacks.
pub fn chunk_name(path: &Path) -> String {
  format!("@{}", path.display())
}
