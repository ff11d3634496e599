//! Scopes and included namespaces.
//!
//! Every executed file gets its own environment table. Name lookups that miss
//! it walk a chain of `__index` metatables:
//!
//! ```text
//! file env -> merged -> hidden (include_defs, require) -> parent scope -> ... -> builtins -> std
//! ```
//!
//! Assignments made by the file land in the env table itself, names received
//! from includes land in the merged layer behind it. That split is what the
//! merge rules consult: a merge may replace another merge's binding, but only
//! a symbol the exporter defines itself replaces a binding the file wrote.
//!
//! Build files and explicitly included files have the root scope as parent,
//! which holds the exports of the default includes. Files executed while the
//! default includes themselves load get the builtins table as parent, so they
//! cannot observe each other.
//!
//! The hidden table carries the functions that must know which file calls
//! them. They are closures created by a small Lua binder, so the environment is
//! held by Lua and not by a Rust callback.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;
use tracing::{debug, trace};

use crate::config::ConfigRead;
use crate::deps::DependencySet;
use crate::error::BuiltinError;
use crate::paths::chunk_name;
use crate::session::SessionHandle;

/// Names starting with this prefix are private to their file.
pub const PRIVATE_PREFIX: &str = "_";
/// Optional list restricting what a file exports.
pub const EXPORT_LIST: &str = "__all__";

const FILE_KEY: &str = "__file";
const MERGED_KEY: &str = "__merged";

const BINDER_KEY: &str = "trellis.scope_binder";
const INCLUDE_HOOK_KEY: &str = "trellis.include_hook";
const REQUIRE_HOOK_KEY: &str = "trellis.require_hook";

const BINDER_SOURCE: &str = "return function(hook, env) return function(...) return hook(env, ...) end end";

/// Register the functions every scope binds to its own environment.
///
/// `include` is called as `include(env, path)`, `require` as
/// `require(env, module)`.
pub fn install_scope_hooks(lua: &Lua, include: LuaFunction, require: LuaFunction) -> LuaResult<()> {
  let binder: LuaFunction = lua.load(BINDER_SOURCE).set_name("=scope_binder").eval()?;
  lua.set_named_registry_value(BINDER_KEY, binder)?;
  lua.set_named_registry_value(INCLUDE_HOOK_KEY, include)?;
  lua.set_named_registry_value(REQUIRE_HOOK_KEY, require)?;
  Ok(())
}

/// A symbol made visible by an included file.
#[derive(Debug, Clone)]
pub struct Export {
  pub name: String,
  pub value: LuaValue,
  /// Defined by the exporting file itself, not received from its own includes.
  pub own: bool,
}

/// A global environment table.
#[derive(Debug, Clone)]
pub struct Scope {
  env: LuaTable,
}

impl Scope {
  fn with_layers(lua: &Lua, fallback: LuaTable, file: &str) -> LuaResult<Scope> {
    let merged = lua.create_table()?;
    let merged_mt = lua.create_table()?;
    merged_mt.raw_set("__index", fallback)?;
    merged.set_metatable(Some(merged_mt))?;

    let env = lua.create_table()?;
    let mt = lua.create_table()?;
    mt.raw_set("__index", merged.clone())?;
    mt.raw_set(FILE_KEY, file)?;
    mt.raw_set(MERGED_KEY, merged)?;
    env.set_metatable(Some(mt))?;
    Ok(Scope { env })
  }

  /// The scope holding default include exports.
  pub fn root(lua: &Lua, builtins: &LuaTable) -> LuaResult<Scope> {
    Self::with_layers(lua, builtins.clone(), "<root>")
  }

  /// A fresh environment for executing `path`, falling back to `parent`.
  pub fn create(lua: &Lua, parent: &LuaTable, path: &Path) -> LuaResult<Scope> {
    let binder: LuaFunction = lua.named_registry_value(BINDER_KEY)?;
    let include: LuaFunction = lua.named_registry_value(INCLUDE_HOOK_KEY)?;
    let require: LuaFunction = lua.named_registry_value(REQUIRE_HOOK_KEY)?;

    let hidden = lua.create_table()?;
    let hidden_mt = lua.create_table()?;
    hidden_mt.raw_set("__index", parent.clone())?;
    hidden.set_metatable(Some(hidden_mt))?;

    let scope = Self::with_layers(lua, hidden.clone(), &path.to_string_lossy())?;
    hidden.raw_set("include_defs", binder.call::<LuaFunction>((include, scope.env.clone()))?)?;
    hidden.raw_set("require", binder.call::<LuaFunction>((require, scope.env.clone()))?)?;
    Ok(scope)
  }

  pub fn from_env(env: LuaTable) -> Scope {
    Scope { env }
  }

  pub fn env(&self) -> &LuaTable {
    &self.env
  }

  /// Path of the file executing in `env`.
  pub fn file_of(env: &LuaTable) -> Option<String> {
    env.metatable()?.raw_get::<Option<String>>(FILE_KEY).ok().flatten()
  }

  /// Symbols this scope received through merges, by name.
  fn merged(&self) -> LuaResult<LuaTable> {
    self
      .env
      .metatable()
      .ok_or_else(|| LuaError::runtime("scope has no metatable"))?
      .raw_get(MERGED_KEY)
  }

  /// The value `name` resolves to in this scope, without the parent chain.
  pub fn binding(&self, name: &str) -> LuaResult<LuaValue> {
    let own: LuaValue = self.env.raw_get(name)?;
    if !own.is_nil() {
      return Ok(own);
    }
    self.merged()?.raw_get(name)
  }

  /// The public symbols of this scope, sorted by name.
  ///
  /// Names starting with `_` are private. If the scope defines `__all__`, only
  /// the names it lists are exported.
  pub fn exports(&self) -> LuaResult<Vec<Export>> {
    let allowed: Option<HashSet<String>> = match self.env.raw_get::<LuaValue>(EXPORT_LIST)? {
      LuaValue::Nil => None,
      LuaValue::Table(list) => Some(list.sequence_values::<String>().collect::<LuaResult<_>>()?),
      other => {
        return Err(LuaError::runtime(format!(
          "{EXPORT_LIST} must be a list of names, got {}",
          other.type_name()
        )));
      }
    };
    let public = |name: &str| {
      !name.starts_with(PRIVATE_PREFIX) && allowed.as_ref().is_none_or(|allowed| allowed.contains(name))
    };

    let mut exports = Vec::new();
    for (table, own) in [(self.env.clone(), true), (self.merged()?, false)] {
      for pair in table.pairs::<LuaValue, LuaValue>() {
        let (key, value) = pair?;
        let LuaValue::String(key) = key else { continue };
        let name = key.to_str()?.to_string();
        if !public(&name) || (!own && !self.env.raw_get::<LuaValue>(name.as_str())?.is_nil()) {
          continue;
        }
        exports.push(Export { name, value, own });
      }
    }
    exports.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(exports)
  }

  /// Bind `exports` into this scope.
  ///
  /// Names the scope does not have yet, and names an earlier merge bound, are
  /// always bound. A name the file assigned itself is only replaced by a symbol
  /// its exporter defines; symbols the exporter merely passes on never clobber
  /// it.
  pub fn merge(&self, exports: &[Export]) -> LuaResult<()> {
    let merged = self.merged()?;
    for export in exports {
      let name = export.name.as_str();
      let assigned = !self.env.raw_get::<LuaValue>(name)?.is_nil();
      if assigned {
        if !export.own {
          trace!(symbol = name, "keeping assigned binding");
          continue;
        }
        self.env.raw_set(name, LuaValue::Nil)?;
      }
      merged.raw_set(name, export.value.clone())?;
    }
    Ok(())
  }
}

/// An included file after execution.
#[derive(Debug)]
pub struct Namespace {
  pub path: PathBuf,
  pub exports: Vec<Export>,
  /// Every file the include read, its own path first.
  pub dependencies: DependencySet,
  pub config_reads: Vec<ConfigRead>,
}

/// Loads included files at most once per engine.
#[derive(Default)]
pub struct NamespaceManager {
  cache: RefCell<HashMap<PathBuf, Rc<Namespace>>>,
  loading: RefCell<Vec<PathBuf>>,
  parent: RefCell<Option<LuaTable>>,
}

impl NamespaceManager {
  pub fn new() -> Self {
    Self::default()
  }

  /// Scope that newly loaded includes fall back to.
  pub fn set_parent(&self, parent: LuaTable) {
    *self.parent.borrow_mut() = Some(parent);
  }

  pub fn cached(&self) -> Vec<PathBuf> {
    let mut paths: Vec<_> = self.cache.borrow().keys().cloned().collect();
    paths.sort();
    paths
  }

  /// Execute `path` once and return its namespace.
  ///
  /// A cached namespace replays the dependencies and config reads of its first
  /// execution into the current session.
  pub fn load(&self, lua: &Lua, session: &SessionHandle, path: &Path) -> LuaResult<Rc<Namespace>> {
    {
      let loading = self.loading.borrow();
      if loading.iter().any(|p| p == path) {
        let mut chain = loading.clone();
        chain.push(path.to_path_buf());
        return Err(BuiltinError::IncludeCycle { chain }.into());
      }
    }

    let cached = self.cache.borrow().get(path).cloned();
    if let Some(namespace) = cached {
      debug!(path = %path.display(), "include cache hit");
      session.with(|s| s.replay(&namespace.dependencies, &namespace.config_reads))?;
      return Ok(namespace);
    }

    let source = fs::read_to_string(path).map_err(|err| BuiltinError::Read {
      path: path.to_path_buf(),
      message: err.to_string(),
    })?;
    let parent = self
      .parent
      .borrow()
      .clone()
      .ok_or_else(|| LuaError::runtime("includes can only be loaded while a build file is evaluated"))?;
    let scope = Scope::create(lua, &parent, path)?;

    self.loading.borrow_mut().push(path.to_path_buf());
    session.with(|s| s.enter_include(path))?;
    let result = lua
      .load(source)
      .set_name(chunk_name(path))
      .set_environment(scope.env().clone())
      .exec();
    let frame = session.with(|s| s.exit_include())?;
    self.loading.borrow_mut().pop();
    result?;

    let frame = frame.unwrap_or_default();
    let namespace = Rc::new(Namespace {
      path: path.to_path_buf(),
      exports: scope.exports()?,
      dependencies: frame.dependencies,
      config_reads: frame.config_reads,
    });
    debug!(
      path = %path.display(),
      exports = namespace.exports.len(),
      dependencies = namespace.dependencies.len(),
      "loaded include"
    );

    self.cache.borrow_mut().insert(path.to_path_buf(), namespace.clone());
    Ok(namespace)
  }

  /// Load `path` and merge its exports into `target`.
  pub fn include_into(&self, lua: &Lua, session: &SessionHandle, target: &Scope, path: &Path) -> LuaResult<()> {
    let namespace = self.load(lua, session, path)?;
    target.merge(&namespace.exports)
  }
}
