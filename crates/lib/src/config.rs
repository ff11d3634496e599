//! Configuration values and the log of reads made against them.
//!
//! Build files can consult configuration through `read_config(section, key)`.
//! Every such read is a dependency of the evaluation: if the value changes,
//! the build file must be evaluated again. [`ConfigTracker`] serves the reads
//! and keeps the [`ConfigReadLog`] that is returned with the rules.
//!
//! Configuration files are TOML, one table per section:
//!
//! ```toml
//! [cxx]
//! compiler = "clang"
//! optimize = 2
//! ```
//!
//! Scalar values are read as their string form.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Every `(section, key)` pair queried during one evaluation, mapped to the
/// configured value or `None` when the key was absent.
pub type ConfigReadLog = BTreeMap<String, BTreeMap<String, Option<String>>>;

/// Errors produced while building a [`ConfigMap`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("invalid config override '{0}': expected section.key=value")]
  InvalidOverride(String),

  #[error("failed to parse config file {}: {source}", .path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("config value {section}.{key} must be a string, number or boolean")]
  NotScalar { section: String, key: String },

  #[error("failed to read config file {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Read-only `section → key → value` configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMap {
  sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl ConfigMap {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, section: impl Into<String>, key: impl Into<String>, value: impl Into<String>) {
    self
      .sections
      .entry(section.into())
      .or_default()
      .insert(key.into(), value.into());
  }

  pub fn get(&self, section: &str, key: &str) -> Option<&str> {
    self.sections.get(section)?.get(key).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.sections.values().map(BTreeMap::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Overlay `other` on top of `self`; values in `other` win.
  pub fn merge(&mut self, other: ConfigMap) {
    for (section, keys) in other.sections {
      self.sections.entry(section).or_default().extend(keys);
    }
  }

  /// Apply a `section.key=value` override.
  pub fn apply_override(&mut self, spec: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidOverride(spec.to_string());
    let (name, value) = spec.split_once('=').ok_or_else(invalid)?;
    let (section, key) = name.trim().split_once('.').ok_or_else(invalid)?;
    if section.is_empty() || key.is_empty() {
      return Err(invalid());
    }
    self.insert(section, key, value.trim());
    Ok(())
  }

  /// Parse TOML source. `path` is only used for error messages.
  pub fn parse(source: &str, path: &Path) -> Result<Self, ConfigError> {
    let sections: BTreeMap<String, BTreeMap<String, toml::Value>> =
      toml::from_str(source).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
      })?;

    let mut config = ConfigMap::new();
    for (section, keys) in sections {
      for (key, value) in keys {
        let value = match value {
          toml::Value::String(s) => s,
          toml::Value::Integer(i) => i.to_string(),
          toml::Value::Float(f) => f.to_string(),
          toml::Value::Boolean(b) => b.to_string(),
          _ => return Err(ConfigError::NotScalar { section, key }),
        };
        config.insert(section.as_str(), key, value);
      }
    }
    Ok(config)
  }

  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let source = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::parse(&source, path)
  }
}

impl<S, K, V> FromIterator<((S, K), V)> for ConfigMap
where
  S: Into<String>,
  K: Into<String>,
  V: Into<String>,
{
  fn from_iter<I: IntoIterator<Item = ((S, K), V)>>(iter: I) -> Self {
    let mut config = ConfigMap::new();
    for ((section, key), value) in iter {
      config.insert(section, key, value);
    }
    config
  }
}

/// One recorded lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRead {
  pub section: String,
  pub key: String,
  pub value: Option<String>,
}

/// Serves config lookups for one evaluation and logs each of them.
#[derive(Debug, Clone)]
pub struct ConfigTracker {
  config: Arc<ConfigMap>,
  log: ConfigReadLog,
}

impl ConfigTracker {
  pub fn new(config: Arc<ConfigMap>) -> Self {
    ConfigTracker {
      config,
      log: ConfigReadLog::new(),
    }
  }

  /// Look up `(section, key)` and record the read, hit or miss.
  pub fn read(&mut self, section: &str, key: &str) -> ConfigRead {
    let read = ConfigRead {
      section: section.to_string(),
      key: key.to_string(),
      value: self.config.get(section, key).map(str::to_string),
    };
    self.record(read.clone());
    read
  }

  /// Record a read observed elsewhere, e.g. by a cached include.
  pub fn record(&mut self, read: ConfigRead) {
    self.log.entry(read.section).or_default().insert(read.key, read.value);
  }

  pub fn log(&self) -> &ConfigReadLog {
    &self.log
  }

  pub fn into_log(self) -> ConfigReadLog {
    self.log
  }
}
