//! trellis-lib: evaluation of Lua build files
//!
//! A build file is a Lua script that declares build rules. This crate runs
//! build files in isolated scopes and turns them into:
//! - `Rule`: one declared rule, a map of JSON values
//! - `DependencySet`: every file the evaluation read
//! - `ConfigReadLog`: every configuration value the evaluation consulted
//! - `Diagnostics`: recoverable problems, such as a failed glob service query
//!
//! [`engine::Engine`] is the entry point.

pub mod config;
pub mod deps;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod glob;
pub mod lua;
pub mod paths;
pub mod rule;
pub mod session;

pub use engine::{DEFAULT_BUILD_FILE_NAME, Engine, EngineConfig};
pub use error::{BuiltinError, EvalError};
pub use rule::{Entry, Rule, RuleFunction};
