//! The set of files an evaluation read.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};

/// Absolute paths of every file that influenced one evaluation, in the order
/// they were first seen.
///
/// Build systems use this set to decide when a build file has to be evaluated
/// again: a change to any listed file invalidates the cached result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySet {
  paths: Vec<PathBuf>,
  seen: HashSet<PathBuf>,
}

impl DependencySet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record `path`. Returns `false` if it was already present.
  pub fn record(&mut self, path: impl Into<PathBuf>) -> bool {
    let path = path.into();
    if self.seen.contains(&path) {
      return false;
    }
    self.seen.insert(path.clone());
    self.paths.push(path);
    true
  }

  pub fn contains(&self, path: &Path) -> bool {
    self.seen.contains(path)
  }

  pub fn iter(&self) -> impl Iterator<Item = &Path> {
    self.paths.iter().map(PathBuf::as_path)
  }

  pub fn as_slice(&self) -> &[PathBuf] {
    &self.paths
  }

  pub fn len(&self) -> usize {
    self.paths.len()
  }

  pub fn is_empty(&self) -> bool {
    self.paths.is_empty()
  }
}

impl<'a> IntoIterator for &'a DependencySet {
  type Item = &'a PathBuf;
  type IntoIter = std::slice::Iter<'a, PathBuf>;

  fn into_iter(self) -> Self::IntoIter {
    self.paths.iter()
  }
}

impl Serialize for DependencySet {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(&self.paths)
  }
}
