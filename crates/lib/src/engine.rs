//! Build file evaluation.
//!
//! An [`Engine`] owns one Lua VM and evaluates build files one at a time.
//! Included files are executed at most once per engine and reused by every
//! later evaluation; each evaluation still reports them as dependencies.
//!
//! # Example
//! ```ignore
//! use std::path::Path;
//! use trellis_lib::diagnostics::Diagnostics;
//! use trellis_lib::engine::{Engine, EngineConfig};
//!
//! let mut engine = Engine::new(EngineConfig::new("/repo").with_default_include("//defs/BUILD_DEFS"))?;
//! let mut diagnostics = Diagnostics::new();
//! let entries = engine.process(Path::new("java/com/BUILD"), &mut diagnostics)?;
//! ```

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use mlua::prelude::*;
use tracing::{debug, info};

use crate::config::ConfigMap;
use crate::diagnostics::Diagnostics;
use crate::error::EvalError;
use crate::glob::{GlobResolver, GlobService};
use crate::lua::builtins::{BuiltinContext, BuiltinSet, install_scope_functions};
use crate::lua::namespace::{NamespaceManager, Scope};
use crate::lua::runtime;
use crate::lua::sandbox::ImportGuard;
use crate::paths::{self, chunk_name, resolve_project_path};
use crate::rule::{Entry, RuleFunction};
use crate::session::{Session, SessionHandle};

/// Build file name used when none is configured.
pub const DEFAULT_BUILD_FILE_NAME: &str = "BUILD";

/// Settings fixed for the lifetime of an [`Engine`].
#[derive(Clone)]
pub struct EngineConfig {
  pub project_root: PathBuf,
  pub build_file_name: String,
  /// `//`-prefixed or absolute paths executed before every build file.
  pub default_includes: Vec<String>,
  pub config: ConfigMap,
  pub glob_service: Option<Arc<dyn GlobService>>,
  /// Root the glob service watches. Defaults to the project root.
  pub watch_root: Option<PathBuf>,
  pub sandboxing: bool,
  pub rule_functions: Vec<RuleFunction>,
  pub allow_empty_globs: bool,
}

impl fmt::Debug for EngineConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EngineConfig")
      .field("project_root", &self.project_root)
      .field("build_file_name", &self.build_file_name)
      .field("default_includes", &self.default_includes)
      .field("config", &self.config)
      .field("glob_service", &self.glob_service.is_some())
      .field("watch_root", &self.watch_root)
      .field("sandboxing", &self.sandboxing)
      .field("rule_functions", &self.rule_functions)
      .field("allow_empty_globs", &self.allow_empty_globs)
      .finish()
  }
}

impl EngineConfig {
  pub fn new(project_root: impl Into<PathBuf>) -> Self {
    EngineConfig {
      project_root: project_root.into(),
      build_file_name: DEFAULT_BUILD_FILE_NAME.to_string(),
      default_includes: Vec::new(),
      config: ConfigMap::new(),
      glob_service: None,
      watch_root: None,
      sandboxing: false,
      rule_functions: Vec::new(),
      allow_empty_globs: false,
    }
  }

  pub fn with_build_file_name(mut self, name: impl Into<String>) -> Self {
    self.build_file_name = name.into();
    self
  }

  pub fn with_default_include(mut self, include: impl Into<String>) -> Self {
    self.default_includes.push(include.into());
    self
  }

  pub fn with_config(mut self, config: ConfigMap) -> Self {
    self.config = config;
    self
  }

  pub fn with_glob_service(mut self, service: Arc<dyn GlobService>) -> Self {
    self.glob_service = Some(service);
    self
  }

  pub fn with_watch_root(mut self, watch_root: impl Into<PathBuf>) -> Self {
    self.watch_root = Some(watch_root.into());
    self
  }

  pub fn with_sandboxing(mut self, enabled: bool) -> Self {
    self.sandboxing = enabled;
    self
  }

  pub fn with_rule_function(mut self, function: RuleFunction) -> Self {
    self.rule_functions.push(function);
    self
  }

  pub fn with_allow_empty_globs(mut self, allow: bool) -> Self {
    self.allow_empty_globs = allow;
    self
  }
}

/// Evaluates build files against one project.
pub struct Engine {
  config: EngineConfig,
  project_root: PathBuf,
  lua: Lua,
  builtins: LuaTable,
  session: SessionHandle,
  namespaces: Rc<NamespaceManager>,
  imports: Rc<ImportGuard>,
  config_map: Arc<ConfigMap>,
  generation: u64,
}

impl Engine {
  pub fn new(config: EngineConfig) -> Result<Self, EvalError> {
    let project_root = dunce::canonicalize(&config.project_root).map_err(|source| EvalError::ProjectRoot {
      path: config.project_root.clone(),
      source,
    })?;

    let lua = runtime::create_runtime(&project_root)?;
    let session = SessionHandle::new();
    let namespaces = Rc::new(NamespaceManager::new());
    let imports = Rc::new(ImportGuard::new(config.sandboxing));
    imports.install_searcher(&lua)?;

    let watch_root = config.watch_root.clone().unwrap_or_else(|| project_root.clone());
    let ctx = Rc::new(BuiltinContext {
      session: session.clone(),
      namespaces: namespaces.clone(),
      globs: GlobResolver::new(config.glob_service.clone(), watch_root),
      allow_empty_globs: config.allow_empty_globs,
      project_root: project_root.clone(),
      imports: imports.clone(),
    });
    install_scope_functions(&lua, &ctx)?;

    let std = runtime::create_std_table(&lua)?;
    let builtins = runtime::create_builtin_table(&lua, &std)?;
    let set = BuiltinSet::standard(&lua, &ctx, &config.rule_functions)?;
    set.install(&builtins)?;
    debug!(builtins = ?set.names().collect::<Vec<_>>(), "engine ready");

    Ok(Engine {
      config_map: Arc::new(config.config.clone()),
      config,
      project_root,
      lua,
      builtins,
      session,
      namespaces,
      imports,
      generation: 0,
    })
  }

  pub fn project_root(&self) -> &Path {
    &self.project_root
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Redirect sandbox import notices. They go to stdout by default.
  pub fn set_notice_writer(&self, writer: Box<dyn Write>) {
    self.imports.set_notice_writer(writer);
  }

  /// Included files executed so far.
  pub fn cached_includes(&self) -> Vec<PathBuf> {
    self.namespaces.cached()
  }

  /// Evaluate one build file.
  ///
  /// `build_file` is relative to the project root or absolute. On success the
  /// result lists the declared rules in order, then the dependency record,
  /// then the config read record. Diagnostics are added to `diagnostics`
  /// whether or not evaluation succeeds.
  pub fn process(&mut self, build_file: &Path, diagnostics: &mut Diagnostics) -> Result<Vec<Entry>, EvalError> {
    let build_file = paths::normalize(&self.project_root.join(build_file));
    if !build_file.is_file() {
      return Err(EvalError::NotFound(build_file));
    }

    self.generation += 1;
    let base_path = paths::base_path(&self.project_root, &build_file);
    info!(build_file = %build_file.display(), base_path = %base_path, "evaluating build file");

    self.session.begin(Session::new(
      build_file.clone(),
      base_path,
      self.generation,
      self.config_map.clone(),
    ));
    let result = self.evaluate(&build_file);
    let session = self.session.finish();

    let Some(mut session) = session else {
      return Err(EvalError::Runtime(LuaError::runtime("evaluation session was lost")));
    };
    diagnostics.extend(session.take_diagnostics());

    match result {
      Ok(()) => {
        let entries = session.into_entries();
        debug!(build_file = %build_file.display(), entries = entries.len(), "evaluated build file");
        Ok(entries)
      }
      Err(err) => Err(EvalError::from_lua(&build_file, err)),
    }
  }

  fn evaluate(&self, build_file: &Path) -> LuaResult<()> {
    self.session.record_dependency(build_file)?;

    // Default includes must not see each other.
    self.namespaces.set_parent(self.builtins.clone());
    let root = Scope::root(&self.lua, &self.builtins)?;
    for include in &self.config.default_includes {
      let path = resolve_project_path(&self.project_root, include)?;
      self.namespaces.include_into(&self.lua, &self.session, &root, &path)?;
    }
    self.namespaces.set_parent(root.env().clone());

    let source = std::fs::read_to_string(build_file).map_err(|err| crate::error::BuiltinError::Read {
      path: build_file.to_path_buf(),
      message: err.to_string(),
    })?;
    let scope = Scope::create(&self.lua, root.env(), build_file)?;
    self
      .lua
      .load(source)
      .set_name(chunk_name(build_file))
      .set_environment(scope.env().clone())
      .exec()
  }
}
