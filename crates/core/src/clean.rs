//! Derived-artifact sweep and directory scrub
//!
//! After the external clean command has run, the tree may still hold files
//! regenerated from templated sources (e.g. `foo.pyx` -> `foo.cpp`,
//! `foo.html`) and generated documentation or packaging-metadata
//! directories. Both are removed here so the next build starts from
//! nothing derived.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::CoreError;
use bindery_lua::DerivedDecl;

#[derive(Debug, Default, Serialize)]
pub struct CleanStats {
    pub sources_scanned: usize,
    pub derived_removed: usize,
    pub dirs_scrubbed: usize,
    pub bytes_freed: u64,
}

#[derive(Debug, Serialize)]
pub struct CleanReport {
    pub stats: CleanStats,
    pub removed_paths: Vec<PathBuf>,
}

/// Sweep derived artifacts and scrub generated directories
///
/// Deleting something that does not exist is a no-op, never an error.
pub fn clean_tree(
    root: &Path,
    derived: &[DerivedDecl],
    scrub: &[PathBuf],
    dry_run: bool,
) -> Result<CleanReport, CoreError> {
    let mut stats = CleanStats::default();
    let mut removed_paths = Vec::new();

    sweep_derived(root, derived, dry_run, &mut stats, &mut removed_paths);
    scrub_dirs(root, scrub, dry_run, &mut stats, &mut removed_paths);

    info!(
        derived_removed = stats.derived_removed,
        dirs_scrubbed = stats.dirs_scrubbed,
        bytes_freed = stats.bytes_freed,
        dry_run,
        "clean sweep complete"
    );

    Ok(CleanReport {
        stats,
        removed_paths,
    })
}

/// Delete every file derived from a templated source
///
/// A file is derived when its stem matches a templated source and its
/// extension is in that source's strip set.
fn sweep_derived(
    root: &Path,
    derived: &[DerivedDecl],
    dry_run: bool,
    stats: &mut CleanStats,
    removed_paths: &mut Vec<PathBuf>,
) {
    if derived.is_empty() {
        return;
    }

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext,
            None => continue,
        };

        for decl in derived {
            if ext != decl.from {
                continue;
            }

            stats.sources_scanned += 1;

            for strip_ext in &decl.strip {
                let candidate = path.with_extension(strip_ext);
                if remove_file_if_exists(&candidate, dry_run, stats) {
                    debug!(path = %candidate.display(), "removed derived file");
                    stats.derived_removed += 1;
                    removed_paths.push(candidate);
                }
            }
        }
    }
}

/// Remove declared generated directories wholesale
fn scrub_dirs(
    root: &Path,
    scrub: &[PathBuf],
    dry_run: bool,
    stats: &mut CleanStats,
    removed_paths: &mut Vec<PathBuf>,
) {
    for rel in scrub {
        let path = root.join(rel);
        if !path.exists() {
            continue;
        }

        let size = dir_size(&path);
        debug!(path = %path.display(), "scrubbing directory");

        if dry_run {
            stats.dirs_scrubbed += 1;
            stats.bytes_freed += size;
            removed_paths.push(path);
            continue;
        }

        match fs::remove_dir_all(&path) {
            Ok(()) => {
                stats.dirs_scrubbed += 1;
                stats.bytes_freed += size;
                removed_paths.push(path);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to scrub directory");
            }
        }
    }
}

/// Delete a single file, treating absence as a no-op
///
/// Returns true when the file existed (or would have been deleted in a
/// dry run).
fn remove_file_if_exists(path: &Path, dry_run: bool, stats: &mut CleanStats) -> bool {
    let size = match path.symlink_metadata() {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => return false,
    };

    if dry_run {
        stats.bytes_freed += size;
        return true;
    }

    match fs::remove_file(path) {
        Ok(()) => {
            stats.bytes_freed += size;
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove derived file");
            false
        }
    }
}

fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
