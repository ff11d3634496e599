//! Functions the engine provides to build files.
//!
//! | Name                 | Where          | Effect                                        |
//! |----------------------|----------------|-----------------------------------------------|
//! | `add_rule`           | build files    | declare a rule                                |
//! | `glob`               | build files    | match files under the build file's directory  |
//! | `get_base_path`      | build files    | build file directory relative to the root     |
//! | `get_build_env`      | anywhere       | handle to the evaluation in progress          |
//! | `read_config`        | anywhere       | look up a configuration value                 |
//! | `add_build_file_dep` | anywhere       | record an extra input file                    |
//! | `include_defs`       | anywhere       | execute a file and import its public names    |
//! | `require`            | anywhere       | load a Lua module                             |
//!
//! "Build files" means the function fails when called while the top level of
//! an included file is executing. Functions defined in includes may call them
//! freely once a build file runs them.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;

use super::convert::{string_list, table_to_rule};
use super::namespace::{NamespaceManager, Scope};
use super::sandbox::{ImportGuard, guarded_require};
use crate::error::BuiltinError;
use crate::glob::{GlobRequest, GlobResolver};
use crate::paths::resolve_project_path;
use crate::rule::RuleFunction;
use crate::session::SessionHandle;

/// What the builtins share.
pub struct BuiltinContext {
  pub session: SessionHandle,
  pub namespaces: Rc<NamespaceManager>,
  pub globs: GlobResolver,
  pub allow_empty_globs: bool,
  pub project_root: PathBuf,
  pub imports: Rc<ImportGuard>,
}

/// Handle returned by `get_build_env()`.
///
/// Only valid for the evaluation that produced it.
#[derive(Debug, Clone)]
pub struct BuildEnv {
  pub build_file: PathBuf,
  pub base_path: String,
  pub generation: u64,
}

impl LuaUserData for BuildEnv {
  fn add_fields<F: LuaUserDataFields<Self>>(fields: &mut F) {
    fields.add_field_method_get("base_path", |_, this| Ok(this.base_path.clone()));
    fields.add_field_method_get("build_file", |_, this| {
      Ok(this.build_file.to_string_lossy().into_owned())
    });
  }
}

/// The engine's named functions, in registration order.
pub struct BuiltinSet {
  functions: Vec<(String, LuaFunction)>,
}

impl BuiltinSet {
  /// The standard builtins plus one function per rule type.
  pub fn standard(lua: &Lua, ctx: &Rc<BuiltinContext>, rule_functions: &[RuleFunction]) -> LuaResult<Self> {
    let mut set = BuiltinSet { functions: Vec::new() };
    set.insert("add_rule", add_rule(lua, ctx.clone())?);
    set.insert("glob", glob(lua, ctx.clone())?);
    set.insert("get_base_path", get_base_path(lua, ctx.clone())?);
    set.insert("get_build_env", get_build_env(lua, ctx.clone())?);
    set.insert("read_config", read_config(lua, ctx.clone())?);
    set.insert("add_build_file_dep", add_build_file_dep(lua, ctx.clone())?);
    for function in rule_functions {
      set.insert(function.name.clone(), rule_function(lua, ctx.clone(), function.clone())?);
    }
    Ok(set)
  }

  pub fn insert(&mut self, name: impl Into<String>, function: LuaFunction) {
    let name = name.into();
    self.functions.retain(|(existing, _)| *existing != name);
    self.functions.push((name, function));
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.functions.iter().map(|(name, _)| name.as_str())
  }

  pub fn install(&self, table: &LuaTable) -> LuaResult<()> {
    for (name, function) in &self.functions {
      table.raw_set(name.as_str(), function.clone())?;
    }
    Ok(())
  }
}

/// Register the per-scope `include_defs` and `require` hooks.
pub fn install_scope_functions(lua: &Lua, ctx: &Rc<BuiltinContext>) -> LuaResult<()> {
  let include_ctx = ctx.clone();
  let include = lua.create_function(move |lua, (env, spec): (LuaTable, String)| {
    let path = resolve_project_path(&include_ctx.project_root, &spec)?;
    include_ctx
      .namespaces
      .include_into(lua, &include_ctx.session, &Scope::from_env(env), &path)
  })?;

  let require_ctx = ctx.clone();
  let require = lua.create_function(move |lua, (env, name): (LuaTable, String)| {
    guarded_require(lua, &require_ctx.imports, &require_ctx.session, &env, name)
  })?;

  super::namespace::install_scope_hooks(lua, include, require)
}

fn ensure_build_file(ctx: &BuiltinContext, function: &'static str) -> LuaResult<()> {
  if ctx.session.with(|s| s.in_include())? {
    return Err(BuiltinError::NotInBuildFile { function }.into());
  }
  Ok(())
}

fn check_build_env(ctx: &BuiltinContext, build_env: Option<LuaAnyUserData>) -> LuaResult<()> {
  let Some(build_env) = build_env else {
    return Ok(());
  };
  let generation = build_env.borrow::<BuildEnv>()?.generation;
  if ctx.session.with(|s| s.generation())? != generation {
    return Err(BuiltinError::StaleBuildEnv.into());
  }
  Ok(())
}

/// `add_rule(rule[, build_env])`
fn add_rule(lua: &Lua, ctx: Rc<BuiltinContext>) -> LuaResult<LuaFunction> {
  lua.create_function(move |_, (rule, build_env): (LuaTable, Option<LuaAnyUserData>)| {
    check_build_env(&ctx, build_env)?;
    let rule = table_to_rule(&rule)?;
    ctx.session.add_rule(rule)
  })
}

/// `name { ... }` for a registered rule type.
fn rule_function(lua: &Lua, ctx: Rc<BuiltinContext>, function: RuleFunction) -> LuaResult<LuaFunction> {
  lua.create_function(move |_, args: LuaTable| {
    let rule = function.apply(table_to_rule(&args)?);
    ctx.session.add_rule(rule)
  })
}

fn glob_request(patterns: LuaValue, options: Option<LuaTable>, allow_empty_default: bool) -> LuaResult<GlobRequest> {
  let mut request = GlobRequest::new(string_list(patterns, "glob patterns")?);
  request.allow_empty = allow_empty_default;
  if let Some(options) = options {
    request.excludes = string_list(options.get("excludes")?, "glob excludes")?;
    if let Some(dotfiles) = options.get::<Option<bool>>("include_dotfiles")? {
      request.include_dotfiles = dotfiles;
    }
    if let Some(allow_empty) = options.get::<Option<bool>>("allow_empty")? {
      request.allow_empty = allow_empty;
    }
  }
  Ok(request)
}

/// `glob(patterns[, { excludes = ..., include_dotfiles = ..., allow_empty = ... }])`
fn glob(lua: &Lua, ctx: Rc<BuiltinContext>) -> LuaResult<LuaFunction> {
  lua.create_function(move |lua, (patterns, options): (LuaValue, Option<LuaTable>)| {
    ensure_build_file(&ctx, "glob")?;
    let request = glob_request(patterns, options, ctx.allow_empty_globs)?;

    let files = ctx.session.with(|s| {
      let base_dir = s.build_file().parent().unwrap_or(Path::new("/")).to_path_buf();
      ctx.globs.resolve(&base_dir, &request, s.diagnostics_mut())
    })??;

    lua.create_sequence_from(files)
  })
}

/// `get_base_path()`
fn get_base_path(lua: &Lua, ctx: Rc<BuiltinContext>) -> LuaResult<LuaFunction> {
  lua.create_function(move |_, ()| {
    ensure_build_file(&ctx, "get_base_path")?;
    ctx.session.with(|s| s.base_path().to_string())
  })
}

/// `get_build_env()`
fn get_build_env(lua: &Lua, ctx: Rc<BuiltinContext>) -> LuaResult<LuaFunction> {
  lua.create_function(move |lua, ()| {
    let env = ctx.session.with(|s| BuildEnv {
      build_file: s.build_file().to_path_buf(),
      base_path: s.base_path().to_string(),
      generation: s.generation(),
    })?;
    lua.create_userdata(env)
  })
}

/// `read_config(section, key[, default])`
fn read_config(lua: &Lua, ctx: Rc<BuiltinContext>) -> LuaResult<LuaFunction> {
  lua.create_function(move |lua, (section, key, default): (String, String, LuaValue)| {
    match ctx.session.with(|s| s.read_config(&section, &key))? {
      Some(value) => Ok(LuaValue::String(lua.create_string(value)?)),
      None => Ok(default),
    }
  })
}

/// `add_build_file_dep(path)`
fn add_build_file_dep(lua: &Lua, ctx: Rc<BuiltinContext>) -> LuaResult<LuaFunction> {
  lua.create_function(move |_, spec: String| {
    let path = resolve_project_path(&ctx.project_root, &spec)?;
    ctx.session.record_dependency(&path)
  })
}
