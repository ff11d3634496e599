//! Build file discovery.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::{DirEntry, WalkDir};

fn is_hidden(entry: &DirEntry) -> bool {
  entry.file_name().to_str().is_some_and(|name| name.starts_with('.'))
}

/// Every file named `name` under `root`, relative to `root`, sorted.
pub fn find_build_files(root: &Path, name: &str) -> Result<Vec<PathBuf>> {
  let mut files = Vec::new();
  let walker = WalkDir::new(root)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

  for entry in walker {
    let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
    if entry.file_type().is_file() && entry.file_name() == name {
      let relative = entry.path().strip_prefix(root)?;
      files.push(relative.to_path_buf());
    }
  }
  Ok(files)
}
