//! Shared helpers for evaluation tests.

use std::cell::RefCell;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;
use tempfile::TempDir;
use trellis_lib::config::ConfigReadLog;
use trellis_lib::diagnostics::Diagnostics;
use trellis_lib::glob::{GlobQuery, GlobService, GlobServiceError, QueryResponse};
use trellis_lib::rule::{self, Entry};
use trellis_lib::{BuiltinError, Engine, EngineConfig, EvalError};

/// A project root in a temporary directory.
pub struct Project {
  pub temp: TempDir,
  pub root: PathBuf,
}

impl Project {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let root = dunce::canonicalize(temp.path()).unwrap();
    Self { temp, root }
  }

  /// Write a file relative to the project root.
  pub fn write(&self, relative_path: &str, content: &str) -> &Self {
    let path = self.path(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    self
  }

  pub fn path(&self, relative_path: &str) -> PathBuf {
    self.root.join(relative_path)
  }

  pub fn config(&self) -> EngineConfig {
    EngineConfig::new(&self.root)
  }

  pub fn engine(&self, config: EngineConfig) -> Engine {
    Engine::new(config).unwrap()
  }
}

/// Evaluate `build_file` and return the result with its diagnostics.
pub fn process(engine: &mut Engine, build_file: &str) -> (Result<Vec<Entry>, EvalError>, Diagnostics) {
  let mut diagnostics = Diagnostics::new();
  let result = engine.process(Path::new(build_file), &mut diagnostics);
  (result, diagnostics)
}

/// Evaluate `build_file`, panicking on failure.
pub fn entries(engine: &mut Engine, build_file: &str) -> Vec<Entry> {
  let (result, _) = process(engine, build_file);
  result.unwrap_or_else(|e| panic!("evaluating {build_file} failed: {e}"))
}

/// The builtin failure of a failed evaluation.
pub fn builtin_error(engine: &mut Engine, build_file: &str) -> BuiltinError {
  let (result, _) = process(engine, build_file);
  let err = result.expect_err("evaluation should fail");
  err
    .builtin()
    .cloned()
    .unwrap_or_else(|| panic!("expected a builtin error, got {err}"))
}

/// Field `field` of the rule named `name`.
pub fn field(entries: &[Entry], name: &str, field: &str) -> Value {
  rule::rules(entries)
    .find(|r| r.name() == Some(name))
    .unwrap_or_else(|| panic!("no rule named {name}"))
    .get(field)
    .cloned()
    .unwrap_or(Value::Null)
}

pub fn includes(entries: &[Entry]) -> Vec<PathBuf> {
  rule::includes(entries).expect("includes entry").as_slice().to_vec()
}

pub fn configs(entries: &[Entry]) -> ConfigReadLog {
  rule::configs(entries).expect("configs entry").clone()
}

/// A `Write` whose contents stay readable after the engine takes it.
#[derive(Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
  pub fn contents(&self) -> String {
    String::from_utf8_lossy(&self.0.borrow()).into_owned()
  }
}

impl Write for SharedBuffer {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.0.borrow_mut().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

pub enum GlobReply {
  Files(Vec<&'static str>),
  Warning(&'static str, Vec<&'static str>),
  Error(&'static str),
}

/// Glob service answering every query the same way.
pub struct FakeGlobService {
  reply: GlobReply,
  calls: AtomicUsize,
  queries: Mutex<Vec<GlobQuery>>,
}

impl FakeGlobService {
  pub fn new(reply: GlobReply) -> Self {
    Self {
      reply,
      calls: AtomicUsize::new(0),
      queries: Mutex::new(Vec::new()),
    }
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn last_query(&self) -> Option<GlobQuery> {
    self.queries.lock().unwrap().last().cloned()
  }
}

fn owned(files: &[&str]) -> Vec<String> {
  files.iter().map(|f| f.to_string()).collect()
}

impl GlobService for FakeGlobService {
  fn query(&self, query: &GlobQuery) -> Result<QueryResponse, GlobServiceError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.queries.lock().unwrap().push(query.clone());
    match &self.reply {
      GlobReply::Files(files) => Ok(QueryResponse {
        files: owned(files),
        warning: None,
      }),
      GlobReply::Warning(warning, files) => Ok(QueryResponse {
        files: owned(files),
        warning: Some(warning.to_string()),
      }),
      GlobReply::Error(message) => Err(GlobServiceError::Query(message.to_string())),
    }
  }
}
