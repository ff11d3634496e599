//! Lua value conversion for rule records.

use std::collections::BTreeMap;

use mlua::prelude::*;
use serde_json::{Number, Value};

use crate::error::BuiltinError;
use crate::rule::Rule;

/// Nesting limit for rule values; also stops self-referencing tables.
const MAX_DEPTH: usize = 64;

fn invalid(field: &str, reason: impl Into<String>) -> LuaError {
  BuiltinError::InvalidRuleValue {
    field: field.to_string(),
    reason: reason.into(),
  }
  .into()
}

/// Convert the table passed to `add_rule()` into a [`Rule`].
pub fn table_to_rule(table: &LuaTable) -> LuaResult<Rule> {
  let mut fields = BTreeMap::new();
  for pair in table.pairs::<LuaValue, LuaValue>() {
    let (key, value) = pair?;
    let LuaValue::String(key) = key else {
      return Err(invalid(&format!("{key:?}"), "rule field names must be strings"));
    };
    let key = key.to_str()?.to_string();
    let value = to_json(value, &key, 0)?;
    fields.insert(key, value);
  }
  Ok(Rule::from(fields))
}

/// Convert a Lua value to JSON. `field` names the rule field for error messages.
///
/// Tables with a non-empty array part starting at index 1 become arrays, other
/// tables become objects; an empty table is an empty array. A list with holes
/// or with keys besides its items is rejected.
pub fn to_json(value: LuaValue, field: &str, depth: usize) -> LuaResult<Value> {
  if depth > MAX_DEPTH {
    return Err(invalid(field, "value is nested too deeply"));
  }

  match value {
    LuaValue::Nil => Ok(Value::Null),
    LuaValue::Boolean(b) => Ok(Value::Bool(b)),
    LuaValue::Integer(i) => Ok(Value::from(i)),
    LuaValue::Number(n) => Number::from_f64(n)
      .map(Value::Number)
      .ok_or_else(|| invalid(field, format!("{n} is not a finite number"))),
    LuaValue::String(s) => Ok(Value::String(s.to_str()?.to_string())),
    LuaValue::Table(t) => {
      let len = t.raw_len();
      let first: LuaValue = t.raw_get(1)?;
      if len > 0 && !first.is_nil() {
        for pair in t.pairs::<LuaValue, LuaValue>() {
          let (k, _) = pair?;
          let in_list = matches!(k, LuaValue::Integer(i) if i >= 1 && i as usize <= len);
          if !in_list {
            return Err(invalid(field, format!("list has an extra key {}", describe_key(&k)?)));
          }
        }
        let mut items = Vec::with_capacity(len);
        for i in 1..=len {
          let item: LuaValue = t.raw_get(i)?;
          items.push(to_json(item, field, depth + 1)?);
        }
        return Ok(Value::Array(items));
      }

      let mut map = serde_json::Map::new();
      for pair in t.pairs::<LuaValue, LuaValue>() {
        let (k, v) = pair?;
        let key = match k {
          LuaValue::String(s) => s.to_str()?.to_string(),
          other => return Err(invalid(field, format!("table keys must be strings, got {}", other.type_name()))),
        };
        map.insert(key, to_json(v, field, depth + 1)?);
      }
      if map.is_empty() {
        return Ok(Value::Array(Vec::new()));
      }
      Ok(Value::Object(map))
    }
    other => Err(invalid(field, format!("cannot store a {} in a rule", other.type_name()))),
  }
}

fn describe_key(key: &LuaValue) -> LuaResult<String> {
  Ok(match key {
    LuaValue::String(s) => format!("'{}'", s.to_str()?),
    LuaValue::Integer(i) => i.to_string(),
    other => other.type_name().to_string(),
  })
}

/// Accept either a single string or a list of strings.
pub fn string_list(value: LuaValue, what: &str) -> LuaResult<Vec<String>> {
  match value {
    LuaValue::String(s) => Ok(vec![s.to_str()?.to_string()]),
    LuaValue::Table(t) => t
      .sequence_values::<LuaValue>()
      .map(|item| match item? {
        LuaValue::String(s) => Ok(s.to_str()?.to_string()),
        other => Err(LuaError::runtime(format!(
          "{what} must contain only strings, got {}",
          other.type_name()
        ))),
      })
      .collect(),
    LuaValue::Nil => Ok(Vec::new()),
    other => Err(LuaError::runtime(format!(
      "{what} must be a string or a list of strings, got {}",
      other.type_name()
    ))),
  }
}
