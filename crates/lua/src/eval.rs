//! Lua configuration evaluation

use crate::error::LuaError;
use crate::globals::{
    Declarations, setup_bindery_global, setup_bundle_function, setup_derived_function,
    setup_project_function, setup_scrub_function, setup_stage_function,
};
use crate::types::{BundleDecl, DerivedDecl, ProjectDecl, StageDecl};
use bindery_platform::PlatformInfo;
use mlua::Lua;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::debug;

/// Context for evaluating a rules.lua file
pub struct EvalContext {
    /// Platform information exposed through the bindery global
    pub platform: PlatformInfo,
    /// Build tree root: the directory containing the config file
    pub config_dir: PathBuf,
}

impl EvalContext {
    /// Create a new evaluation context
    pub fn new(config_path: &Path) -> Result<Self, LuaError> {
        let platform = PlatformInfo::current();

        let config_dir = config_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        // Make config_dir absolute
        let config_dir = if config_dir.is_absolute() {
            config_dir
        } else {
            std::env::current_dir()?.join(config_dir)
        };

        Ok(Self {
            platform,
            config_dir,
        })
    }
}

/// Result of evaluating a rules.lua configuration
pub struct EvalResult {
    /// Project declaration (name and passthrough environment)
    pub project: Option<ProjectDecl>,
    /// Stage command declarations
    pub stages: Vec<StageDecl>,
    /// Derived-artifact extension sets
    pub derived: Vec<DerivedDecl>,
    /// Directories scrubbed on clean
    pub scrub: Vec<PathBuf>,
    /// Output bundle declarations
    pub bundles: Vec<BundleDecl>,
}

/// Evaluate a rules.lua file and return the collected declarations
///
/// # Example
///
/// ```ignore
/// use bindery_lua::evaluate_config;
/// use std::path::Path;
///
/// let result = evaluate_config(Path::new("rules.lua"))?;
/// for bundle in result.bundles {
///     println!("Bundle: {}", bundle.name);
/// }
/// ```
pub fn evaluate_config(config_path: &Path) -> Result<EvalResult, LuaError> {
    if !config_path.exists() {
        return Err(LuaError::ConfigNotFound(config_path.display().to_string()));
    }

    let config_source = std::fs::read_to_string(config_path)?;

    let ctx = EvalContext::new(config_path)?;

    evaluate_config_string(&config_source, &ctx)
}

/// Evaluate a rules.lua configuration from a string
///
/// This is useful for testing or when the config is embedded.
pub fn evaluate_config_string(source: &str, ctx: &EvalContext) -> Result<EvalResult, LuaError> {
    let lua = Lua::new();

    // Set up the global bindery table
    setup_bindery_global(&lua, &ctx.platform)?;

    // Create shared declarations state
    let declarations = Rc::new(RefCell::new(Declarations::new()));

    setup_project_function(&lua, declarations.clone())?;
    setup_stage_function(&lua, declarations.clone(), ctx.config_dir.clone())?;
    setup_derived_function(&lua, declarations.clone())?;
    setup_scrub_function(&lua, declarations.clone())?;
    setup_bundle_function(&lua, declarations.clone(), ctx.config_dir.clone())?;

    // Execute the config
    lua.load(source).exec()?;

    // Extract the declarations
    let decls = declarations.borrow();

    debug!(
        stages = decls.stages.len(),
        derived = decls.derived.len(),
        bundles = decls.bundles.len(),
        "config evaluated"
    );

    Ok(EvalResult {
        project: decls.project.clone(),
        stages: decls.stages.clone(),
        derived: decls.derived.clone(),
        scrub: decls.scrub.clone(),
        bundles: decls.bundles.clone(),
    })
}
