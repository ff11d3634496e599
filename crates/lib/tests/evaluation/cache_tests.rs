//! Included files are executed once per engine.

use serde_json::json;
use trellis_lib::BuiltinError;
use trellis_lib::config::ConfigMap;

use super::common::{Project, builtin_error, configs, entries, field, includes};

fn counted_project() -> Project {
  let project = Project::new();
  project
    .write("counter.lua", "return { loads = 0 }")
    .write(
      "defs/COUNTED",
      "local counter = require('counter')\ncounter.loads = counter.loads + 1\nLOADS = counter.loads",
    )
    .write("a/BUILD", "add_rule { name = 'a', loads = LOADS }")
    .write("b/BUILD", "include_defs('//defs/COUNTED')\nadd_rule { name = 'b', loads = LOADS }");
  project
}

#[test]
fn include_runs_once_per_engine() {
  let project = counted_project();
  let mut engine = project.engine(project.config().with_default_include("//defs/COUNTED"));

  let a = entries(&mut engine, "a/BUILD");
  let b = entries(&mut engine, "b/BUILD");
  assert_eq!(field(&a, "a", "loads"), json!(1));
  assert_eq!(field(&b, "b", "loads"), json!(1));
  assert_eq!(engine.cached_includes(), vec![project.path("defs/COUNTED")]);
}

#[test]
fn cached_include_still_reports_its_dependencies() {
  let project = counted_project();
  let mut engine = project.engine(project.config().with_default_include("//defs/COUNTED"));

  entries(&mut engine, "a/BUILD");
  let second = includes(&entries(&mut engine, "a/BUILD"));
  assert_eq!(
    second,
    vec![
      project.path("a/BUILD"),
      project.path("defs/COUNTED"),
      project.path("counter.lua"),
    ]
  );
}

#[test]
fn cached_include_replays_config_reads() {
  let project = Project::new();
  project
    .write("defs/DEFS", "FLAVOR = read_config('build', 'flavor')")
    .write("a/BUILD", "")
    .write("b/BUILD", "");
  let config: ConfigMap = [(("build", "flavor"), "release")].into_iter().collect();
  let mut engine = project.engine(project.config().with_config(config).with_default_include("//defs/DEFS"));

  entries(&mut engine, "a/BUILD");
  let b = entries(&mut engine, "b/BUILD");
  assert_eq!(configs(&b)["build"]["flavor"], Some("release".to_string()));
}

#[test]
fn nested_include_dependencies_reach_the_outer_include() {
  let project = Project::new();
  project
    .write("defs/INNER", "INNER = 1")
    .write("defs/OUTER", "include_defs('//defs/INNER')")
    .write("a/BUILD", "include_defs('//defs/OUTER')")
    .write("b/BUILD", "include_defs('//defs/OUTER')\nadd_rule { name = 'b', inner = INNER }");
  let mut engine = project.engine(project.config());

  entries(&mut engine, "a/BUILD");
  let b = entries(&mut engine, "b/BUILD");
  assert_eq!(field(&b, "b", "inner"), json!(1));
  assert!(includes(&b).contains(&project.path("defs/INNER")));
}

#[test]
fn include_cycle_is_reported() {
  let project = Project::new();
  project
    .write("defs/A", "include_defs('//defs/B')")
    .write("defs/B", "include_defs('//defs/A')")
    .write("BUILD", "include_defs('//defs/A')");
  let mut engine = project.engine(project.config());

  assert_eq!(
    builtin_error(&mut engine, "BUILD"),
    BuiltinError::IncludeCycle {
      chain: vec![project.path("defs/A"), project.path("defs/B"), project.path("defs/A")],
    }
  );
}

#[test]
fn failed_include_is_not_cached() {
  let project = Project::new();
  project
    .write("defs/DEFS", "error('broken')")
    .write("BUILD", "include_defs('//defs/DEFS')\nadd_rule { name = 'r', value = VALUE }");
  let mut engine = project.engine(project.config());

  let (result, _) = super::common::process(&mut engine, "BUILD");
  assert!(result.is_err());
  assert!(engine.cached_includes().is_empty());

  project.write("defs/DEFS", "VALUE = 'fixed'");
  assert_eq!(field(&entries(&mut engine, "BUILD"), "r", "value"), json!("fixed"));
}
