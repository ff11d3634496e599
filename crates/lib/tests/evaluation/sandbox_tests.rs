//! Import notices and module dependencies.

use serde_json::json;

use super::common::{Project, SharedBuffer, entries, field, includes};

fn engine_with_notices(project: &Project, sandboxing: bool) -> (trellis_lib::Engine, SharedBuffer) {
  let engine = project.engine(project.config().with_sandboxing(sandboxing));
  let notices = SharedBuffer::default();
  engine.set_notice_writer(Box::new(notices.clone()));
  (engine, notices)
}

#[test]
fn importing_a_host_module_prints_a_notice() {
  let project = Project::new();
  project.write("BUILD", "local io = require('io')");
  let (mut engine, notices) = engine_with_notices(&project, true);

  entries(&mut engine, "BUILD");
  assert_eq!(
    notices.contents(),
    format!(
      "Importing module io in file {} is discouraged\n",
      project.path("BUILD").display()
    )
  );
}

#[test]
fn notice_names_the_including_file() {
  let project = Project::new();
  project
    .write("defs/DEFS", "local os = require('os')")
    .write("BUILD", "include_defs('//defs/DEFS')");
  let (mut engine, notices) = engine_with_notices(&project, true);

  entries(&mut engine, "BUILD");
  assert!(
    notices
      .contents()
      .contains(&format!("in file {}", project.path("defs/DEFS").display()))
  );
}

#[test]
fn pure_modules_are_silent() {
  let project = Project::new();
  project.write(
    "BUILD",
    "local s = require('string')\nadd_rule { name = 'r', value = s.upper('x') }",
  );
  let (mut engine, notices) = engine_with_notices(&project, true);

  assert_eq!(field(&entries(&mut engine, "BUILD"), "r", "value"), json!("X"));
  assert!(notices.contents().is_empty());
}

#[test]
fn disabled_sandbox_is_silent() {
  let project = Project::new();
  project.write("BUILD", "local io = require('io')");
  let (mut engine, notices) = engine_with_notices(&project, false);

  entries(&mut engine, "BUILD");
  assert!(notices.contents().is_empty());
}

#[test]
fn project_modules_are_dependencies() {
  let project = Project::new();
  project
    .write("tools/naming.lua", "return { prefix = function(n) return 'lib-' .. n end }")
    .write("BUILD", "local naming = require('tools.naming')\nadd_rule { name = naming.prefix('a') }");
  let (mut engine, notices) = engine_with_notices(&project, true);

  let entries = entries(&mut engine, "BUILD");
  assert_eq!(field(&entries, "lib-a", "name"), json!("lib-a"));
  assert!(includes(&entries).contains(&project.path("tools/naming.lua")));
  assert!(notices.contents().contains("Importing module tools.naming"));
}
