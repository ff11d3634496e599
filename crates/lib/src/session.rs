//! Per-evaluation state.
//!
//! A [`Session`] lives for exactly one `Engine::process` call. It collects the
//! declared rules, the files read, the config lookups made and any
//! diagnostics. While an included file is executing, an [`IncludeFrame`] is
//! open for it, so the include's own dependencies can be cached alongside its
//! exports.

use std::cell::RefCell;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use mlua::prelude::*;
use serde_json::Value;
use tracing::trace;

use crate::config::{ConfigMap, ConfigRead, ConfigTracker};
use crate::deps::DependencySet;
use crate::diagnostics::Diagnostics;
use crate::error::BuiltinError;
use crate::rule::{BASE_PATH_KEY, Entry, NAME_KEY, Rule};

/// Everything an included file read while it executed.
#[derive(Debug, Clone, Default)]
pub struct IncludeFrame {
  pub path: PathBuf,
  pub dependencies: DependencySet,
  pub config_reads: Vec<ConfigRead>,
}

pub struct Session {
  build_file: PathBuf,
  base_path: String,
  generation: u64,
  frames: Vec<IncludeFrame>,
  rules: Vec<Rule>,
  rule_names: HashSet<String>,
  dependencies: DependencySet,
  config: ConfigTracker,
  diagnostics: Diagnostics,
}

impl Session {
  pub fn new(build_file: PathBuf, base_path: String, generation: u64, config: Arc<ConfigMap>) -> Self {
    Session {
      build_file,
      base_path,
      generation,
      frames: Vec::new(),
      rules: Vec::new(),
      rule_names: HashSet::new(),
      dependencies: DependencySet::new(),
      config: ConfigTracker::new(config),
      diagnostics: Diagnostics::new(),
    }
  }

  pub fn build_file(&self) -> &Path {
    &self.build_file
  }

  pub fn base_path(&self) -> &str {
    &self.base_path
  }

  pub fn generation(&self) -> u64 {
    self.generation
  }

  /// Whether the top level of an included file is executing.
  pub fn in_include(&self) -> bool {
    !self.frames.is_empty()
  }

  /// Record a file read by the evaluation and by every open include.
  pub fn record_dependency(&mut self, path: &Path) {
    if self.dependencies.record(path) {
      trace!(path = %path.display(), "recorded dependency");
    }
    for frame in &mut self.frames {
      frame.dependencies.record(path);
    }
  }

  pub fn enter_include(&mut self, path: &Path) {
    self.record_dependency(path);
    let mut frame = IncludeFrame {
      path: path.to_path_buf(),
      ..Default::default()
    };
    frame.dependencies.record(path);
    self.frames.push(frame);
  }

  pub fn exit_include(&mut self) -> Option<IncludeFrame> {
    self.frames.pop()
  }

  pub fn read_config(&mut self, section: &str, key: &str) -> Option<String> {
    let read = self.config.read(section, key);
    for frame in &mut self.frames {
      frame.config_reads.push(read.clone());
    }
    read.value
  }

  /// Re-apply what a cached include read when it was first executed.
  pub fn replay(&mut self, dependencies: &DependencySet, config_reads: &[ConfigRead]) {
    for path in dependencies {
      self.record_dependency(path);
    }
    for read in config_reads {
      self.config.record(read.clone());
      for frame in &mut self.frames {
        frame.config_reads.push(read.clone());
      }
    }
  }

  pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
    &mut self.diagnostics
  }

  pub fn take_diagnostics(&mut self) -> Diagnostics {
    std::mem::take(&mut self.diagnostics)
  }

  /// Validate and record a rule declared by the build file.
  pub fn add_rule(&mut self, mut rule: Rule) -> Result<(), BuiltinError> {
    if self.in_include() {
      return Err(BuiltinError::NotInBuildFile { function: "add_rule" });
    }

    let name = match rule.get(NAME_KEY) {
      None | Some(Value::Null) => return Err(BuiltinError::MissingRuleName),
      Some(Value::String(name)) => name.clone(),
      Some(other) => {
        return Err(BuiltinError::InvalidRuleValue {
          field: NAME_KEY.to_string(),
          reason: format!("expected a string, got {other}"),
        });
      }
    };

    if !self.rule_names.insert(name.clone()) {
      return Err(BuiltinError::DuplicateRule { name });
    }

    rule.insert(BASE_PATH_KEY, Value::String(self.base_path.clone()));
    trace!(rule = %name, "declared rule");
    self.rules.push(rule);
    Ok(())
  }

  pub fn rules(&self) -> &[Rule] {
    &self.rules
  }

  pub fn dependencies(&self) -> &DependencySet {
    &self.dependencies
  }

  /// The rules followed by the dependency and config records.
  pub fn into_entries(self) -> Vec<Entry> {
    let mut entries: Vec<Entry> = self.rules.into_iter().map(Entry::Rule).collect();
    entries.push(Entry::Includes {
      includes: self.dependencies,
    });
    entries.push(Entry::Configs {
      configs: self.config.into_log(),
    });
    entries
  }
}

/// Shared slot for the active [`Session`], captured by builtins.
#[derive(Clone, Default)]
pub struct SessionHandle(Rc<RefCell<Option<Session>>>);

impl SessionHandle {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn begin(&self, session: Session) {
    *self.0.borrow_mut() = Some(session);
  }

  pub fn finish(&self) -> Option<Session> {
    self.0.borrow_mut().take()
  }

  /// Run `f` against the active session.
  ///
  /// The session is borrowed only for the duration of `f`, which must not call
  /// back into Lua.
  pub fn with<R>(&self, f: impl FnOnce(&mut Session) -> R) -> LuaResult<R> {
    let mut slot = self.0.borrow_mut();
    let session = slot
      .as_mut()
      .ok_or_else(|| LuaError::runtime("build file functions can only be called while a build file is evaluated"))?;
    Ok(f(session))
  }

  pub fn record_dependency(&self, path: &Path) -> LuaResult<()> {
    self.with(|s| s.record_dependency(path))
  }

  pub fn add_rule(&self, rule: Rule) -> LuaResult<()> {
    self.with(|s| s.add_rule(rule))?.map_err(LuaError::from)
  }
}
