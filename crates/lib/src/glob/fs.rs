//! Direct filesystem globbing.

use std::collections::BTreeSet;
use std::path::Path;

use glob::{MatchOptions, Pattern};
use tracing::debug;

use super::GlobRequest;
use crate::error::BuiltinError;
use crate::paths::to_slash;

fn match_options(include_dotfiles: bool) -> MatchOptions {
  MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: !include_dotfiles,
  }
}

fn invalid(pattern: &str, err: glob::PatternError) -> BuiltinError {
  BuiltinError::InvalidGlobPattern {
    pattern: pattern.to_string(),
    reason: err.msg.to_string(),
  }
}

/// Match `request` against the files under `base_dir`.
///
/// Returns paths relative to `base_dir`, `/`-separated, sorted and without
/// duplicates. Directories never match.
pub fn glob(base_dir: &Path, request: &GlobRequest) -> Result<Vec<String>, BuiltinError> {
  let options = match_options(request.include_dotfiles);
  let excludes = request
    .excludes
    .iter()
    .map(|pattern| Pattern::new(pattern).map_err(|err| invalid(pattern, err)))
    .collect::<Result<Vec<_>, _>>()?;

  let root = Pattern::escape(&base_dir.to_string_lossy());
  let mut matches = BTreeSet::new();

  for include in &request.includes {
    let full = format!("{}/{}", root.trim_end_matches('/'), include);
    let paths = glob::glob_with(&full, options).map_err(|err| invalid(include, err))?;

    for entry in paths {
      let path = match entry {
        Ok(path) => path,
        Err(err) => {
          debug!(error = %err, "skipping unreadable glob entry");
          continue;
        }
      };
      if !path.is_file() {
        continue;
      }
      let Ok(relative) = path.strip_prefix(base_dir) else {
        continue;
      };
      let relative = to_slash(relative);
      if excludes.iter().any(|exclude| exclude.matches_with(&relative, options)) {
        continue;
      }
      matches.insert(relative);
    }
  }

  Ok(matches.into_iter().collect())
}
