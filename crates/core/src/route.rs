//! The artifact router: route-plan computation and application
//!
//! Routing is computed first and applied second, so `bindery plan` can show
//! exactly what `bindery install` would do. For each bundle, in declaration
//! order:
//!
//! 1. `purge` subtrees under the bundle root are deleted unconditionally,
//!    tolerant of absence (leftover staging from earlier layouts).
//! 2. Routing rules copy matching tree files under the bundle root. A
//!    source claimed by an earlier rule is not routed again by a later one.
//! 3. A `keep` pattern post-filters the bundle: every staged file not
//!    matching it is deleted and emptied directories are pruned.
//!
//! Copies leave the build tree untouched, so installing twice from an
//! unchanged tree lands the same files in the same bundles.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::CoreError;
use crate::manifest::compile_pattern;
use bindery_lua::BundleDecl;

/// One planned file copy into a bundle
#[derive(Debug, Clone, Serialize)]
pub struct RouteAction {
    /// Receiving bundle
    pub bundle: String,
    /// Source path in the build tree
    pub source: PathBuf,
    /// Destination path under the bundle root
    pub dest: PathBuf,
    /// Required artifacts abort the install when missing
    pub required: bool,
    /// Source did not exist when the plan was computed
    pub missing: bool,
}

impl RouteAction {
    /// Get a human-readable description of the action
    pub fn description(&self) -> String {
        if self.missing {
            format!("missing{}", if self.required { ", required" } else { "" })
        } else {
            format!("-> {}", self.dest.display())
        }
    }
}

/// A subtree deleted before routing
#[derive(Debug, Clone, Serialize)]
pub struct PurgeAction {
    pub bundle: String,
    pub path: PathBuf,
}

/// A post-routing bundle filter
#[derive(Debug, Clone, Serialize)]
pub struct KeepFilter {
    pub bundle: String,
    pub root: PathBuf,
    pub pattern: String,
}

/// The complete routing plan for one install
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoutePlan {
    pub purges: Vec<PurgeAction>,
    pub copies: Vec<RouteAction>,
    pub keeps: Vec<KeepFilter>,
}

impl RoutePlan {
    /// Check if the plan would do anything at all
    pub fn is_empty(&self) -> bool {
        self.purges.is_empty() && self.copies.is_empty() && self.keeps.is_empty()
    }

    /// Number of files that would be copied
    pub fn copy_count(&self) -> usize {
        self.copies.iter().filter(|c| !c.missing).count()
    }
}

/// Outcome of applying a route plan
#[derive(Debug, Default, Serialize)]
pub struct RouteStats {
    pub trees_purged: usize,
    pub files_copied: usize,
    pub files_pruned: usize,
}

/// Compute the routing plan for the given bundles
///
/// Bundle order and rule order are declaration order; the first rule to
/// claim a source wins (see DESIGN.md on overlapping rules). Two rules
/// routing different sources to the same destination is an error, not a
/// silent overwrite.
pub fn compute_routes(root: &Path, bundles: &[BundleDecl]) -> Result<RoutePlan, CoreError> {
    let mut plan = RoutePlan::default();
    let mut claimed: HashSet<PathBuf> = HashSet::new();
    let mut dests: HashSet<PathBuf> = HashSet::new();

    for bundle in bundles {
        for purge in &bundle.purge {
            // An absolute purge path would escape the bundle root entirely
            if purge.is_absolute() {
                return Err(CoreError::Manifest(format!(
                    "bundle '{}': purge path '{}' must be relative to the bundle root",
                    bundle.name,
                    purge.display()
                )));
            }
            plan.purges.push(PurgeAction {
                bundle: bundle.name.clone(),
                path: bundle.root.join(purge),
            });
        }

        for rule in &bundle.rules {
            let dest_dir = bundle.root.join(&rule.to);

            if let Some(pattern) = &rule.glob {
                let absolute = root.join(pattern);
                let matches = glob::glob(&absolute.to_string_lossy()).map_err(|source| {
                    CoreError::Pattern {
                        pattern: pattern.clone(),
                        source,
                    }
                })?;

                // Structure below the pattern's fixed prefix is preserved,
                // so `build/sphinx/html/**/*` keeps its subdirectories
                let prefix = root.join(glob_prefix(pattern));

                for source in matches.filter_map(|m| m.ok()) {
                    if !source.is_file() || !claimed.insert(source.clone()) {
                        continue;
                    }
                    // A wildcard-free pattern names the file itself, so
                    // the stripped path can be empty
                    let dest = match source.strip_prefix(&prefix) {
                        Ok(rel) if !rel.as_os_str().is_empty() => dest_dir.join(rel),
                        _ => dest_dir.join(source.file_name().unwrap_or(source.as_os_str())),
                    };
                    let action = route_to(bundle, &source, dest, false);
                    check_collision(&mut dests, &action)?;
                    plan.copies.push(action);
                }
            }

            if let Some(file) = &rule.file {
                let source = root.join(file);
                if !claimed.insert(source.clone()) {
                    continue;
                }
                let missing = !source.is_file();
                let dest = dest_dir.join(source.file_name().unwrap_or(source.as_os_str()));
                let mut action = route_to(bundle, &source, dest, true);
                action.missing = missing;
                check_collision(&mut dests, &action)?;
                plan.copies.push(action);
            }
        }

        if let Some(pattern) = &bundle.keep {
            plan.keeps.push(KeepFilter {
                bundle: bundle.name.clone(),
                root: bundle.root.clone(),
                pattern: pattern.clone(),
            });
        }
    }

    debug!(
        purges = plan.purges.len(),
        copies = plan.copies.len(),
        keeps = plan.keeps.len(),
        "route plan computed"
    );

    Ok(plan)
}

fn route_to(bundle: &BundleDecl, source: &Path, dest: PathBuf, required: bool) -> RouteAction {
    RouteAction {
        bundle: bundle.name.clone(),
        source: source.to_path_buf(),
        dest,
        required,
        missing: false,
    }
}

/// The pattern's fixed directory prefix: every component before the first
/// one containing a wildcard
fn glob_prefix(pattern: &str) -> PathBuf {
    let mut prefix = PathBuf::new();
    for part in Path::new(pattern).components() {
        if part.as_os_str().to_string_lossy().contains(['*', '?', '[']) {
            break;
        }
        prefix.push(part);
    }
    prefix
}

fn check_collision(dests: &mut HashSet<PathBuf>, action: &RouteAction) -> Result<(), CoreError> {
    if !dests.insert(action.dest.clone()) {
        return Err(CoreError::RouteCollision {
            bundle: action.bundle.clone(),
            dest: action.dest.clone(),
        });
    }
    Ok(())
}

/// Apply a routing plan: purge, copy, then keep-filter
pub fn apply_routes(plan: &RoutePlan) -> Result<RouteStats, CoreError> {
    let mut stats = RouteStats::default();

    for purge in &plan.purges {
        if purge_tree(&purge.path)? {
            debug!(bundle = %purge.bundle, path = %purge.path.display(), "purged leftover tree");
            stats.trees_purged += 1;
        }
    }

    for copy in &plan.copies {
        if !copy.source.is_file() {
            if copy.required {
                return Err(CoreError::MissingArtifact {
                    bundle: copy.bundle.clone(),
                    path: copy.source.clone(),
                });
            }
            debug!(source = %copy.source.display(), "source vanished since plan, skipping");
            continue;
        }

        if let Some(parent) = copy.dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&copy.source, &copy.dest)?;
        stats.files_copied += 1;
    }

    for keep in &plan.keeps {
        stats.files_pruned += apply_keep_filter(keep)?;
    }

    info!(
        trees_purged = stats.trees_purged,
        files_copied = stats.files_copied,
        files_pruned = stats.files_pruned,
        "route plan applied"
    );

    Ok(stats)
}

/// Delete a leftover staging subtree; absence is a no-op
fn purge_tree(path: &Path) -> Result<bool, CoreError> {
    match path.symlink_metadata() {
        Ok(meta) if meta.is_dir() => {
            fs::remove_dir_all(path)?;
            Ok(true)
        }
        Ok(_) => {
            fs::remove_file(path)?;
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Delete every staged file not matching the keep pattern, then prune
/// emptied directories
///
/// Patterns containing a separator match the path relative to the bundle
/// root; bare patterns like "*.so" match the file name alone.
fn apply_keep_filter(keep: &KeepFilter) -> Result<usize, CoreError> {
    if !keep.root.exists() {
        return Ok(0);
    }

    let pattern = compile_pattern(&keep.pattern)?;
    let match_full_path = keep.pattern.contains('/');
    let mut pruned = 0;

    for entry in WalkDir::new(&keep.root)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path == keep.root {
            continue;
        }

        if entry.file_type().is_dir() {
            // Only emptied directories go; remove_dir fails on non-empty
            let _ = fs::remove_dir(path);
            continue;
        }

        let matches = if match_full_path {
            path.strip_prefix(&keep.root)
                .map(|rel| pattern.matches_path(rel))
                .unwrap_or(false)
        } else {
            path.file_name()
                .map(|name| pattern.matches_path(Path::new(name)))
                .unwrap_or(false)
        };

        if !matches {
            match fs::remove_file(path) {
                Ok(()) => pruned += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to prune from bundle");
                }
            }
        }
    }

    debug!(bundle = %keep.bundle, pattern = %keep.pattern, pruned, "keep filter applied");

    Ok(pruned)
}
