//! Error types for bindery-core

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in core operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Lua evaluation error: {0}")]
    Lua(#[from] bindery_lua::LuaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid glob pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },

    #[error("Failed to spawn '{program}' for stage '{stage}': {source}")]
    Spawn {
        stage: String,
        program: String,
        source: std::io::Error,
    },

    #[error("Stage '{stage}' failed with exit code {code:?}")]
    StageFailed { stage: String, code: Option<i32> },

    #[error("Required artifact missing for bundle '{bundle}': {path}")]
    MissingArtifact { bundle: String, path: PathBuf },

    #[error("Two rules route to '{dest}' in bundle '{bundle}'")]
    RouteCollision { bundle: String, dest: PathBuf },

    #[error("Invalid manifest: {0}")]
    Manifest(String),
}

impl CoreError {
    /// The exit code to propagate from the process, mirroring the first
    /// failed subprocess where one exists
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::StageFailed { code: Some(c), .. } => *c,
            _ => 1,
        }
    }
}
