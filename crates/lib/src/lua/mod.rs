//! Lua side of build file evaluation.
//!
//! - [`runtime`] creates the VM and the curated standard library
//! - [`namespace`] implements scopes, includes and the include cache
//! - [`builtins`] defines the functions build files call
//! - [`sandbox`] guards `require`
//! - [`convert`] turns Lua values into rule fields

pub mod builtins;
pub mod convert;
pub mod namespace;
pub mod runtime;
pub mod sandbox;
