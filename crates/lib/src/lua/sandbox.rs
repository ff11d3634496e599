//! Guarded `require`.
//!
//! Build files are meant to be pure functions of their inputs. Lua modules
//! outside the pure standard library are still importable, but each import is
//! announced on the notice stream when sandboxing is enabled. Modules loaded
//! from disk are recorded as dependencies of the build file being evaluated.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;

use mlua::prelude::*;
use tracing::debug;

use super::namespace::Scope;
use crate::paths::chunk_name;
use crate::session::SessionHandle;

/// Modules that can be required without a notice.
pub const SAFE_MODULES: &[&str] = &["string", "table", "math", "utf8", "coroutine"];

const ORIGINAL_REQUIRE_KEY: &str = "trellis.original_require";

/// State behind the guarded `require`.
pub struct ImportGuard {
  enabled: bool,
  notices: RefCell<Box<dyn Write>>,
  resolved: Rc<RefCell<HashMap<String, PathBuf>>>,
}

impl ImportGuard {
  pub fn new(enabled: bool) -> Self {
    ImportGuard {
      enabled,
      notices: RefCell::new(Box::new(io::stdout())),
      resolved: Rc::new(RefCell::new(HashMap::new())),
    }
  }

  pub fn enabled(&self) -> bool {
    self.enabled
  }

  /// Redirect import notices, e.g. to capture them in tests.
  pub fn set_notice_writer(&self, writer: Box<dyn Write>) {
    *self.notices.borrow_mut() = writer;
  }

  fn notify(&self, module: &str, file: &str) -> io::Result<()> {
    let mut out = self.notices.borrow_mut();
    writeln!(out, "Importing module {module} in file {file} is discouraged")?;
    out.flush()
  }

  /// File a module was loaded from, if it came from disk.
  pub fn resolved_path(&self, module: &str) -> Option<PathBuf> {
    self.resolved.borrow().get(module).cloned()
  }

  /// Replace `package.searchers[2]` with a searcher that remembers where each
  /// module was found.
  pub fn install_searcher(&self, lua: &Lua) -> LuaResult<()> {
    let resolved = self.resolved.clone();
    let searcher = lua.create_function(move |lua, modname: String| {
      let package: LuaTable = lua.globals().get("package")?;
      let path: String = package.get("path")?;
      let searchpath: LuaFunction = package.get("searchpath")?;
      let (found, message): (Option<String>, Option<String>) = searchpath.call((modname.clone(), path))?;

      let Some(file) = found else {
        return Ok((LuaValue::Nil, LuaValue::String(lua.create_string(message.unwrap_or_default())?)));
      };

      let file_path = PathBuf::from(&file);
      resolved.borrow_mut().insert(modname, file_path.clone());

      let loader = lua.create_function(move |lua, _: LuaMultiValue| {
        let source = std::fs::read_to_string(&file_path)
          .map_err(|e| LuaError::external(format!("cannot read '{}': {e}", file_path.display())))?;
        lua.load(source).set_name(chunk_name(&file_path)).eval::<LuaValue>()
      })?;
      Ok((LuaValue::Function(loader), LuaValue::String(lua.create_string(&file)?)))
    })?;

    let package: LuaTable = lua.globals().get("package")?;
    let searchers: LuaTable = package.get("searchers")?;
    searchers.set(2, searcher)?;

    let require: LuaFunction = lua.globals().get("require")?;
    lua.set_named_registry_value(ORIGINAL_REQUIRE_KEY, require)?;
    Ok(())
  }
}

/// `require(name)` as seen from the scope `env`.
pub fn guarded_require(
  lua: &Lua,
  guard: &ImportGuard,
  session: &SessionHandle,
  env: &LuaTable,
  name: String,
) -> LuaResult<LuaMultiValue> {
  if guard.enabled && !SAFE_MODULES.contains(&name.as_str()) {
    let file = Scope::file_of(env).unwrap_or_else(|| "<unknown>".to_string());
    guard.notify(&name, &file).map_err(LuaError::external)?;
  }

  let require: LuaFunction = lua.named_registry_value(ORIGINAL_REQUIRE_KEY)?;
  let result = require.call::<LuaMultiValue>(name.as_str())?;

  if let Some(path) = guard.resolved_path(&name) {
    debug!(module = %name, path = %path.display(), "required lua module");
    session.record_dependency(&path)?;
  }
  Ok(result)
}
