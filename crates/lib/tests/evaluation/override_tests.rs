//! Redefining builtins and names provided by earlier includes.

use serde_json::json;

use super::common::{Project, entries, field};

const BUILD: &str = "add_rule { name = 'r', base = get_base_path() }";

fn config(project: &Project) -> trellis_lib::EngineConfig {
  project
    .config()
    .with_default_include("//BUILD_DEFS")
    .with_default_include("//OTHER_DEFS")
}

#[test]
fn default_include_can_override_a_builtin() {
  let project = Project::new();
  project
    .write("BUILD_DEFS", "function get_base_path() return 'overridden' end")
    .write("OTHER_DEFS", "")
    .write("pkg/BUILD", BUILD);
  let mut engine = project.engine(config(&project));

  assert_eq!(field(&entries(&mut engine, "pkg/BUILD"), "r", "base"), json!("overridden"));
}

#[test]
fn later_include_does_not_restore_the_builtin() {
  let project = Project::new();
  project
    .write("BUILD_DEFS", "function get_base_path() return 'overridden' end")
    .write("OTHER_DEFS", "OTHER = get_base_path")
    .write("pkg/BUILD", BUILD);
  let mut engine = project.engine(config(&project));

  assert_eq!(field(&entries(&mut engine, "pkg/BUILD"), "r", "base"), json!("overridden"));
}

#[test]
fn later_definition_wins() {
  let project = Project::new();
  project
    .write("BUILD_DEFS", "function get_base_path() return 'overridden' end")
    .write("OTHER_DEFS", "function get_base_path() return 'other' end")
    .write("pkg/BUILD", BUILD);
  let mut engine = project.engine(config(&project));

  assert_eq!(field(&entries(&mut engine, "pkg/BUILD"), "r", "base"), json!("other"));
}

#[test]
fn passed_on_definition_replaces_an_earlier_include() {
  let project = Project::new();
  project
    .write("BUILD_DEFS", "function get_base_path() return 'overridden' end")
    .write("INNER_DEFS", "function get_base_path() return 'inner' end")
    .write("OTHER_DEFS", "include_defs('//INNER_DEFS')")
    .write("pkg/BUILD", BUILD);
  let mut engine = project.engine(config(&project));

  assert_eq!(field(&entries(&mut engine, "pkg/BUILD"), "r", "base"), json!("inner"));
}

#[test]
fn later_explicit_include_replaces_merged_name() {
  let project = Project::new();
  project
    .write("C_DEFS", "X = 'c'")
    .write("E_DEFS", "X = 'e'")
    .write("D_DEFS", "include_defs('//E_DEFS')")
    .write(
      "BUILD",
      "include_defs('//C_DEFS')\ninclude_defs('//D_DEFS')\nadd_rule { name = 'r', x = X }",
    );
  let mut engine = project.engine(project.config());

  assert_eq!(field(&entries(&mut engine, "BUILD"), "r", "x"), json!("e"));
}

#[test]
fn passed_on_definition_keeps_an_assigned_name() {
  let project = Project::new();
  project
    .write("C_DEFS", "X = 'c'")
    .write("D_DEFS", "include_defs('//C_DEFS')")
    .write(
      "BUILD",
      "X = 'local'\ninclude_defs('//D_DEFS')\nadd_rule { name = 'r', x = X }",
    );
  let mut engine = project.engine(project.config());

  assert_eq!(field(&entries(&mut engine, "BUILD"), "r", "x"), json!("local"));
}

mod nested_include {
  use super::*;

  const DEFS: &str = "\
function get_base_path() return 'a' end
BEFORE = get_base_path()
include_defs('//B_DEFS')
AFTER = get_base_path()
";

  const BUILD: &str = "add_rule { name = 'r', before = BEFORE, after = AFTER, base = get_base_path() }";

  fn run(b_defs: &str, extra: &[(&str, &str)]) -> Vec<trellis_lib::Entry> {
    let project = Project::new();
    project.write("A_DEFS", DEFS).write("B_DEFS", b_defs).write("pkg/BUILD", BUILD);
    for (path, contents) in extra {
      project.write(path, contents);
    }
    let mut engine = project.engine(project.config().with_default_include("//A_DEFS"));
    entries(&mut engine, "pkg/BUILD")
  }

  #[test]
  fn override_survives_an_include_that_does_not_define_it() {
    let entries = run("HELPER = 1", &[]);
    assert_eq!(field(&entries, "r", "before"), json!("a"));
    assert_eq!(field(&entries, "r", "after"), json!("a"));
    assert_eq!(field(&entries, "r", "base"), json!("a"));
  }

  #[test]
  fn override_survives_an_include_that_passes_the_name_on() {
    let entries = run(
      "include_defs('//C_DEFS')",
      &[("C_DEFS", "function get_base_path() return 'c' end")],
    );
    assert_eq!(field(&entries, "r", "after"), json!("a"));
    assert_eq!(field(&entries, "r", "base"), json!("a"));
  }

  #[test]
  fn include_that_redefines_the_name_wins_after_it_loads() {
    let entries = run("function get_base_path() return 'b' end", &[]);
    assert_eq!(field(&entries, "r", "before"), json!("a"));
    assert_eq!(field(&entries, "r", "after"), json!("b"));
    assert_eq!(field(&entries, "r", "base"), json!("b"));
  }
}

#[test]
fn builtin_is_used_without_overrides() {
  let project = Project::new();
  project
    .write("BUILD_DEFS", "")
    .write("OTHER_DEFS", "")
    .write("pkg/sub/BUILD", BUILD);
  let mut engine = project.engine(config(&project));

  assert_eq!(field(&entries(&mut engine, "pkg/sub/BUILD"), "r", "base"), json!("pkg/sub"));
}

#[test]
fn build_file_can_shadow_an_included_name() {
  let project = Project::new();
  project
    .write("BUILD_DEFS", "FLAVOR = 'default'")
    .write("OTHER_DEFS", "")
    .write("BUILD", "FLAVOR = 'local'\nadd_rule { name = 'r', flavor = FLAVOR }");
  let mut engine = project.engine(config(&project));

  assert_eq!(field(&entries(&mut engine, "BUILD"), "r", "flavor"), json!("local"));
}
