//! Lua VM setup and the bottom of every scope chain.

use std::path::Path;

use mlua::prelude::*;

use crate::error::BuiltinError;

/// Standard globals build files can see. Everything that touches the host
/// (`io`, `os`, `load`, `dofile`, ...) is left out.
pub const SAFE_GLOBALS: &[&str] = &[
  "assert",
  "error",
  "ipairs",
  "next",
  "pairs",
  "pcall",
  "print",
  "rawequal",
  "rawget",
  "rawlen",
  "rawset",
  "select",
  "setmetatable",
  "getmetatable",
  "tonumber",
  "tostring",
  "type",
  "xpcall",
  "_VERSION",
  "string",
  "table",
  "math",
  "utf8",
  "coroutine",
];

/// Create a Lua VM whose module search path is the project root.
pub fn create_runtime(project_root: &Path) -> LuaResult<Lua> {
  let lua = Lua::new();
  let root = project_root.to_string_lossy();
  let package: LuaTable = lua.globals().get("package")?;
  package.set("path", format!("{root}/?.lua;{root}/?/init.lua"))?;
  package.set("cpath", "")?;
  Ok(lua)
}

/// The curated standard library. Lookups that miss it raise
/// [`BuiltinError::UnboundSymbol`].
pub fn create_std_table(lua: &Lua) -> LuaResult<LuaTable> {
  let globals = lua.globals();
  let std = lua.create_table()?;
  for name in SAFE_GLOBALS {
    std.raw_set(*name, globals.raw_get::<LuaValue>(*name)?)?;
  }

  let unbound = lua.create_function(|_, (_, key): (LuaTable, LuaValue)| -> LuaResult<()> {
    let name = match key {
      LuaValue::String(s) => s.to_string_lossy(),
      other => format!("{other:?}"),
    };
    Err(BuiltinError::UnboundSymbol { name }.into())
  })?;
  let mt = lua.create_table()?;
  mt.raw_set("__index", unbound)?;
  std.set_metatable(Some(mt))?;
  Ok(std)
}

/// Table holding the engine functions, backed by `std`.
pub fn create_builtin_table(lua: &Lua, std: &LuaTable) -> LuaResult<LuaTable> {
  let builtins = lua.create_table()?;
  let mt = lua.create_table()?;
  mt.raw_set("__index", std.clone())?;
  builtins.set_metatable(Some(mt))?;
  Ok(builtins)
}
