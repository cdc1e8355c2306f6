//! Platform detection and path handling for bindery
//!
//! This crate provides cross-platform abstractions for:
//! - OS and architecture detection (exposed to rules.lua for conditionals)
//! - Resolution of config-declared paths against the build tree root

mod error;
mod paths;
mod platform;

pub use error::PlatformError;
pub use paths::{expand_path, normalize_path, resolve_in_tree};
pub use platform::{Arch, Os, Platform, PlatformInfo};
