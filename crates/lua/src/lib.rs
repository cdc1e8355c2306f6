//! bindery-lua: Lua runtime for rules.lua configuration
//!
//! This crate evaluates a packaging config and collects typed declarations:
//! - `project{}`: package name and environment passed to every stage
//! - `stage{}`: external command for a named pipeline stage
//! - `derived{}`: templated-source extension and its derived extensions
//! - `scrub{}`: generated directories removed on clean
//! - `bundle{}`: output bundle with routing rules
//!
//! A global `bindery` table exposes platform facts for conditional rules.

mod error;
mod eval;
mod globals;
mod types;

pub use error::LuaError;
pub use eval::{EvalContext, EvalResult, evaluate_config, evaluate_config_string};
pub use globals::Declarations;
pub use types::{BundleDecl, DerivedDecl, ProjectDecl, RouteRule, StageDecl, StageName};
