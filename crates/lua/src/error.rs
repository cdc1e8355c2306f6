//! Error types for bindery-lua

use thiserror::Error;

/// Errors that can occur during Lua evaluation
#[derive(Debug, Error)]
pub enum LuaError {
    #[error("Lua runtime error: {0}")]
    Runtime(#[from] mlua::Error),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
