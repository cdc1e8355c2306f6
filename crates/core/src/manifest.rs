//! Manifest assembly and validation

use crate::error::CoreError;
use bindery_lua::{BundleDecl, DerivedDecl, ProjectDecl, StageDecl, StageName};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A manifest representing one packaging run
///
/// This is the intermediate representation produced by evaluating rules.lua.
/// It is re-evaluated on every invocation; nothing persists across runs.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    /// Build tree root: the directory containing rules.lua
    pub root: PathBuf,
    /// Project name and passthrough environment
    pub project: ProjectDecl,
    /// Stage command declarations
    pub stages: Vec<StageDecl>,
    /// Derived-artifact extension sets purged on clean
    pub derived: Vec<DerivedDecl>,
    /// Directories scrubbed on clean, relative to the tree root
    pub scrub: Vec<PathBuf>,
    /// Output bundles, in declaration order
    pub bundles: Vec<BundleDecl>,
}

impl Manifest {
    /// Create a manifest from a rules.lua file
    pub fn from_config(config_path: &Path) -> Result<Self, CoreError> {
        let result = bindery_lua::evaluate_config(config_path)?;

        let root = config_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()?.join(root)
        };

        let manifest = Self {
            root,
            project: result.project.unwrap_or_default(),
            stages: result.stages,
            derived: result.derived,
            scrub: result.scrub,
            bundles: result.bundles,
        };

        manifest.validate()?;
        Ok(manifest)
    }

    /// Look up the command declared for a stage, if any
    pub fn stage(&self, name: StageName) -> Option<&StageDecl> {
        self.stages.iter().find(|s| s.stage == name)
    }

    /// Validate cross-declaration constraints
    ///
    /// Per-declaration validation already ran during Lua evaluation; this
    /// catches duplicates and unparseable glob patterns.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut seen_stages = HashSet::new();
        for stage in &self.stages {
            if !seen_stages.insert(stage.stage) {
                return Err(CoreError::Manifest(format!(
                    "stage '{}' declared more than once",
                    stage.stage
                )));
            }
        }

        let mut seen_bundles = HashSet::new();
        for bundle in &self.bundles {
            if !seen_bundles.insert(bundle.name.as_str()) {
                return Err(CoreError::Manifest(format!(
                    "bundle '{}' declared more than once",
                    bundle.name
                )));
            }

            bundle.validate().map_err(CoreError::Manifest)?;

            for rule in &bundle.rules {
                if let Some(pattern) = &rule.glob {
                    compile_pattern(pattern)?;
                }
            }
            if let Some(pattern) = &bundle.keep {
                compile_pattern(pattern)?;
            }
        }

        Ok(())
    }
}

/// Compile a glob pattern, attaching the pattern text to the error
pub(crate) fn compile_pattern(pattern: &str) -> Result<glob::Pattern, CoreError> {
    glob::Pattern::new(pattern).map_err(|source| CoreError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}
