//! Scope isolation between build files and includes.

use serde_json::json;
use trellis_lib::BuiltinError;

use super::common::{Project, builtin_error, entries, field, includes};

fn unbound(name: &str) -> BuiltinError {
  BuiltinError::UnboundSymbol { name: name.to_string() }
}

#[test]
fn undefined_name_is_an_error() {
  let project = Project::new();
  project.write("BUILD", "local _ = FOO");
  let mut engine = project.engine(project.config());

  assert_eq!(builtin_error(&mut engine, "BUILD"), unbound("FOO"));
}

#[test]
fn default_includes_do_not_see_each_other() {
  let project = Project::new();
  project
    .write("defs/A", "A_VALUE = 1")
    .write("defs/B", "local _ = A_VALUE")
    .write("BUILD", "");
  let config = project
    .config()
    .with_default_include("//defs/A")
    .with_default_include("//defs/B");
  let mut engine = project.engine(config);

  assert_eq!(builtin_error(&mut engine, "BUILD"), unbound("A_VALUE"));
}

#[test]
fn explicit_includes_do_not_see_each_other() {
  let project = Project::new();
  project
    .write("defs/A", "A_VALUE = 1")
    .write("defs/B", "local _ = A_VALUE")
    .write("BUILD", "include_defs('//defs/A')\ninclude_defs('//defs/B')");
  let mut engine = project.engine(project.config());

  assert_eq!(builtin_error(&mut engine, "BUILD"), unbound("A_VALUE"));
}

#[test]
fn default_includes_are_visible_to_explicit_includes() {
  let project = Project::new();
  project
    .write("defs/DEFAULTS", "PREFIX = 'lib'")
    .write("defs/JAVA", "JAVA_NAME = PREFIX .. '-java'")
    .write("BUILD", "include_defs('//defs/JAVA')\nadd_rule { name = JAVA_NAME }");
  let config = project.config().with_default_include("//defs/DEFAULTS");
  let mut engine = project.engine(config);

  let entries = entries(&mut engine, "BUILD");
  assert_eq!(field(&entries, "lib-java", "name"), json!("lib-java"));
}

#[test]
fn include_inside_function_runs_when_called() {
  let project = Project::new();
  project
    .write("defs/A", "A_VALUE = 'a'")
    .write(
      "defs/LAZY",
      "function lazy()\n  include_defs('//defs/A')\n  return A_VALUE\nend",
    )
    .write("uncalled/BUILD", "include_defs('//defs/LAZY')")
    .write("called/BUILD", "include_defs('//defs/LAZY')\nadd_rule { name = 'r', value = lazy() }");
  let mut engine = project.engine(project.config());

  let uncalled = entries(&mut engine, "uncalled/BUILD");
  assert!(!includes(&uncalled).contains(&project.path("defs/A")));

  let called = entries(&mut engine, "called/BUILD");
  assert_eq!(field(&called, "r", "value"), json!("a"));
  assert!(includes(&called).contains(&project.path("defs/A")));
}

#[test]
fn lazy_include_of_missing_file_only_fails_when_called() {
  let project = Project::new();
  project
    .write("defs/LAZY", "function lazy()\n  include_defs('//defs/MISSING')\nend")
    .write("ok/BUILD", "include_defs('//defs/LAZY')")
    .write("bad/BUILD", "include_defs('//defs/LAZY')\nlazy()");
  let mut engine = project.engine(project.config());

  entries(&mut engine, "ok/BUILD");
  assert!(matches!(builtin_error(&mut engine, "bad/BUILD"), BuiltinError::Read { .. }));
}

#[test]
fn private_names_are_not_exported() {
  let project = Project::new();
  project
    .write("defs/DEFS", "_helper = 1\nPUBLIC = 2")
    .write("ok/BUILD", "include_defs('//defs/DEFS')\nadd_rule { name = 'r', value = PUBLIC }")
    .write("bad/BUILD", "include_defs('//defs/DEFS')\nlocal _ = _helper");
  let mut engine = project.engine(project.config());

  assert_eq!(field(&entries(&mut engine, "ok/BUILD"), "r", "value"), json!(2));
  assert_eq!(builtin_error(&mut engine, "bad/BUILD"), unbound("_helper"));
}

#[test]
fn private_functions_still_work_inside_their_file() {
  let project = Project::new();
  project
    .write(
      "defs/DEFS",
      "local function _twice(x) return x * 2 end\n_factor = 3\nfunction scaled(x) return _twice(x) * _factor end",
    )
    .write("BUILD", "include_defs('//defs/DEFS')\nadd_rule { name = 'r', value = scaled(1) }");
  let mut engine = project.engine(project.config());

  assert_eq!(field(&entries(&mut engine, "BUILD"), "r", "value"), json!(6));
}

#[test]
fn export_list_limits_exports() {
  let project = Project::new();
  project
    .write("defs/DEFS", "__all__ = { 'KEPT' }\nKEPT = 1\nDROPPED = 2")
    .write("ok/BUILD", "include_defs('//defs/DEFS')\nadd_rule { name = 'r', value = KEPT }")
    .write("bad/BUILD", "include_defs('//defs/DEFS')\nlocal _ = DROPPED");
  let mut engine = project.engine(project.config());

  assert_eq!(field(&entries(&mut engine, "ok/BUILD"), "r", "value"), json!(1));
  assert_eq!(builtin_error(&mut engine, "bad/BUILD"), unbound("DROPPED"));
}

#[test]
fn export_list_can_name_every_symbol() {
  let project = Project::new();
  project
    .write("defs/DEFS", "__all__ = { 'A', 'B' }\nA = 1\nB = 2")
    .write("BUILD", "include_defs('//defs/DEFS')\nadd_rule { name = 'r', value = A + B }");
  let mut engine = project.engine(project.config());

  assert_eq!(field(&entries(&mut engine, "BUILD"), "r", "value"), json!(3));
}

#[test]
fn includes_can_not_touch_the_host() {
  let project = Project::new();
  project
    .write("defs/DEFS", "local _ = os.getenv('HOME')")
    .write("BUILD", "include_defs('//defs/DEFS')");
  let mut engine = project.engine(project.config());

  assert_eq!(builtin_error(&mut engine, "BUILD"), unbound("os"));
}

#[test]
fn include_path_must_be_project_relative() {
  let project = Project::new();
  project.write("BUILD", "include_defs('defs/DEFS')");
  let mut engine = project.engine(project.config());

  assert!(matches!(builtin_error(&mut engine, "BUILD"), BuiltinError::InvalidPath { .. }));
}
