//! bindery-core: Core logic for bindery
//!
//! This crate provides the manifest, the artifact router, and the
//! clean/build/test/install pipeline.

mod clean;
mod error;
mod exec;
mod manifest;
mod pipeline;
mod route;

pub use clean::{CleanReport, CleanStats, clean_tree};
pub use error::CoreError;
pub use exec::run_stage;
pub use manifest::Manifest;
pub use pipeline::{
    PipelineOptions, PipelineReport, run_build, run_clean, run_install, run_pipeline, run_test,
};
pub use route::{RouteAction, RoutePlan, RouteStats, apply_routes, compute_routes};

// Re-export declaration types from bindery-lua for convenience
pub use bindery_lua::{BundleDecl, DerivedDecl, ProjectDecl, RouteRule, StageDecl, StageName};

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
