//! Path resolution for config-declared paths
//!
//! Paths in rules.lua are written relative to the build tree root (the
//! directory containing the config file). Absolute paths and `~` are
//! honored as escape hatches for stage working directories.

use crate::error::PlatformError;
use std::path::{Path, PathBuf};

/// Expand a path, resolving `~` to the user's home directory
pub fn expand_path<P: AsRef<Path>>(path: P) -> Result<PathBuf, PlatformError> {
    let path = path.as_ref();
    let path_str = path.to_string_lossy();

    if path_str.starts_with("~/") {
        let home = dirs::home_dir().ok_or(PlatformError::NoHomeDirectory)?;
        Ok(home.join(&path_str[2..]))
    } else if path_str == "~" {
        dirs::home_dir().ok_or(PlatformError::NoHomeDirectory)
    } else {
        Ok(path.to_path_buf())
    }
}

/// Resolve a config-declared path against the build tree root
///
/// - `~` is expanded to the home directory
/// - Absolute paths are returned as-is
/// - Relative paths are resolved against `root` and normalized
///
/// # Examples
///
/// ```
/// use bindery_platform::resolve_in_tree;
///
/// let path = resolve_in_tree("build/sphinx/html", "/src/pkg").unwrap();
/// assert_eq!(path.to_string_lossy(), "/src/pkg/build/sphinx/html");
///
/// let path = resolve_in_tree("/opt/staging", "/src/pkg").unwrap();
/// assert_eq!(path.to_string_lossy(), "/opt/staging");
/// ```
pub fn resolve_in_tree<P: AsRef<Path>, B: AsRef<Path>>(
    path: P,
    root: B,
) -> Result<PathBuf, PlatformError> {
    let path = path.as_ref();
    let path_str = path.to_string_lossy();

    if path_str.starts_with('~') {
        return expand_path(path);
    }

    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }

    // Windows: check for drive letter
    #[cfg(windows)]
    if path_str.len() >= 2 && path_str.chars().nth(1) == Some(':') {
        return Ok(path.to_path_buf());
    }

    Ok(normalize_path(&root.as_ref().join(path)))
}

/// Normalize a path by resolving `.` and `..` components without requiring
/// the path to exist
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                if !components.is_empty() {
                    components.pop();
                }
            }
            std::path::Component::CurDir => {}
            other => {
                components.push(other);
            }
        }
    }

    components.iter().collect()
}
