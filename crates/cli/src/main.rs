//! trellis: evaluate Lua build files and print their rules as JSON.

mod discover;
mod output;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use trellis_lib::config::ConfigMap;
use trellis_lib::diagnostics::Diagnostics;
use trellis_lib::glob::{GlobService, WatchmanClient};
use trellis_lib::{DEFAULT_BUILD_FILE_NAME, Engine, EngineConfig, RuleFunction};

use crate::output::Report;

/// Project configuration file read from the root, if present.
const CONFIG_FILE_NAME: &str = ".trellisconfig";

/// trellis - Lua build file evaluator
#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Project root that `//` paths are relative to
  #[arg(long, default_value = ".")]
  root: PathBuf,

  /// Name of build files to discover
  #[arg(long, default_value = DEFAULT_BUILD_FILE_NAME)]
  build_file_name: String,

  /// File executed before every build file (repeatable, e.g. //defs/BUILD_DEFS)
  #[arg(long = "include", value_name = "PATH")]
  includes: Vec<String>,

  /// Override a configuration value
  #[arg(short = 'c', long = "config", value_name = "SECTION.KEY=VALUE")]
  config_overrides: Vec<String>,

  /// Register a rule function; TYPE defaults to NAME
  #[arg(long = "rule", value_name = "NAME[=TYPE]")]
  rules: Vec<String>,

  /// Answer glob() through watchman
  #[arg(long)]
  watchman: bool,

  /// Print a notice when build files import non-pure Lua modules
  #[arg(long)]
  sandbox: bool,

  /// Let glob() return an empty list instead of failing
  #[arg(long)]
  allow_empty_globs: bool,

  /// Number of parallel evaluations
  #[arg(short, long)]
  jobs: Option<usize>,

  /// Enable verbose output
  #[arg(short, long)]
  verbose: bool,

  /// Build files to evaluate, relative to the root (default: all)
  build_files: Vec<PathBuf>,
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let config = engine_config(&cli)?;

  let build_files = if cli.build_files.is_empty() {
    discover::find_build_files(&config.project_root, &config.build_file_name)?
  } else {
    cli.build_files.clone()
  };
  debug!(count = build_files.len(), "evaluating build files");

  if let Some(jobs) = cli.jobs {
    rayon::ThreadPoolBuilder::new()
      .num_threads(jobs)
      .build_global()
      .context("Failed to configure worker threads")?;
  }

  let reports: Vec<Report> = build_files
    .par_iter()
    .map_init(
      || Engine::new(config.clone()).map_err(|e| e.to_string()),
      |engine, path| evaluate(engine, path),
    )
    .collect();

  for report in &reports {
    output::print_report(report)?;
  }

  let failures = reports.iter().filter(|r| r.is_failure()).count();
  output::print_summary(reports.len(), failures);
  if failures > 0 {
    std::process::exit(1);
  }
  Ok(())
}

fn engine_config(cli: &Cli) -> Result<EngineConfig> {
  let mut config_map = ConfigMap::new();
  let config_file = cli.root.join(CONFIG_FILE_NAME);
  if config_file.is_file() {
    config_map = ConfigMap::load(&config_file)?;
  }
  for spec in &cli.config_overrides {
    config_map.apply_override(spec)?;
  }

  let mut config = EngineConfig::new(&cli.root)
    .with_build_file_name(&cli.build_file_name)
    .with_config(config_map)
    .with_sandboxing(cli.sandbox)
    .with_allow_empty_globs(cli.allow_empty_globs);

  for include in &cli.includes {
    config = config.with_default_include(include);
  }
  for rule in &cli.rules {
    config = config.with_rule_function(parse_rule(rule));
  }
  if cli.watchman {
    config = config.with_glob_service(Arc::new(WatchmanClient::new()) as Arc<dyn GlobService>);
  }
  Ok(config)
}

fn parse_rule(spec: &str) -> RuleFunction {
  match spec.split_once('=') {
    Some((name, rule_type)) => RuleFunction::new(name.trim(), rule_type.trim()),
    None => RuleFunction::new(spec.trim(), spec.trim()),
  }
}

fn evaluate(engine: &mut Result<Engine, String>, path: &Path) -> Report {
  let display = path.display().to_string();
  let engine = match engine {
    Ok(engine) => engine,
    Err(err) => return Report::failure(display, err.clone()),
  };

  let mut diagnostics = Diagnostics::new();
  match engine.process(path, &mut diagnostics) {
    Ok(values) => Report::success(display, values, diagnostics),
    Err(err) => Report::failure(display, err.to_string()),
  }
}
