//! File globbing for `glob()`.
//!
//! A [`GlobResolver`] answers glob requests either from an external
//! [`GlobService`] or by walking the filesystem. Service failures never fail an
//! evaluation: they are reported as diagnostics and the filesystem answers
//! instead.

mod fs;
mod watchman;

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::BuiltinError;

pub use fs::glob as fs_glob;
pub use watchman::{GlobQuery, GlobService, GlobServiceError, QueryResponse, WatchmanClient};

/// Arguments of one `glob()` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobRequest {
  pub includes: Vec<String>,
  pub excludes: Vec<String>,
  pub include_dotfiles: bool,
  /// Accept an empty result instead of raising [`BuiltinError::EmptyGlob`].
  pub allow_empty: bool,
}

impl GlobRequest {
  pub fn new(includes: Vec<String>) -> Self {
    GlobRequest {
      includes,
      ..Default::default()
    }
  }

  /// Patterns must stay inside the directory they are evaluated in.
  pub fn validate(&self) -> Result<(), BuiltinError> {
    for pattern in self.includes.iter().chain(&self.excludes) {
      let reason = if pattern.is_empty() {
        Some("pattern is empty")
      } else if Path::new(pattern).is_absolute() || pattern.starts_with('/') {
        Some("pattern must be relative")
      } else if Path::new(pattern).components().any(|c| c == Component::ParentDir) {
        Some("pattern must not contain '..'")
      } else {
        None
      };

      if let Some(reason) = reason {
        return Err(BuiltinError::InvalidGlobPattern {
          pattern: pattern.clone(),
          reason: reason.to_string(),
        });
      }
    }
    Ok(())
  }
}

/// Routes glob requests to the configured backend.
#[derive(Clone, Default)]
pub struct GlobResolver {
  service: Option<Arc<dyn GlobService>>,
  watch_root: PathBuf,
}

impl std::fmt::Debug for GlobResolver {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("GlobResolver")
      .field("service", &self.service.is_some())
      .field("watch_root", &self.watch_root)
      .finish()
  }
}

impl GlobResolver {
  pub fn new(service: Option<Arc<dyn GlobService>>, watch_root: impl Into<PathBuf>) -> Self {
    GlobResolver {
      service,
      watch_root: watch_root.into(),
    }
  }

  /// A resolver that always walks the filesystem.
  pub fn filesystem() -> Self {
    Self::default()
  }

  /// Match `request` under `base_dir`, returning sorted relative paths.
  pub fn resolve(
    &self,
    base_dir: &Path,
    request: &GlobRequest,
    diagnostics: &mut Diagnostics,
  ) -> Result<Vec<String>, BuiltinError> {
    request.validate()?;

    let files = match &self.service {
      None => fs::glob(base_dir, request)?,
      Some(service) => {
        let query = GlobQuery::new(&self.watch_root, base_dir, request);
        match service.query(&query) {
          Ok(response) => {
            if let Some(warning) = response.warning.filter(|w| !w.is_empty()) {
              warn!(%warning, dir = %base_dir.display(), "glob service warning");
              diagnostics.insert(Diagnostic::warning(format!("Watchman warning: {warning}")));
            }
            let mut files = response.files;
            files.sort();
            files.dedup();
            files
          }
          Err(err) => {
            warn!(error = %err, dir = %base_dir.display(), "glob service failed, falling back to filesystem glob");
            diagnostics.insert(Diagnostic::error(format!(
              "Watchman error, falling back to slow glob: {err}"
            )));
            fs::glob(base_dir, request)?
          }
        }
      }
    };

    debug!(dir = %base_dir.display(), patterns = ?request.includes, matched = files.len(), "glob");

    if files.is_empty() && !request.allow_empty {
      return Err(BuiltinError::EmptyGlob {
        patterns: request.includes.clone(),
        dir: base_dir.to_path_buf(),
      });
    }
    Ok(files)
  }
}
