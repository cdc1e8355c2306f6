//! The packaging pipeline: clean -> build -> test -> install
//!
//! Stages run strictly in order, each gated only on the predecessor's
//! success. The first failure aborts the remainder and propagates the
//! subprocess exit code; nothing is retried or rolled back.

use serde::Serialize;
use tracing::{debug, info};

use crate::clean::{CleanReport, CleanStats, clean_tree};
use crate::error::CoreError;
use crate::exec::run_stage;
use crate::manifest::Manifest;
use crate::route::{RouteStats, apply_routes, compute_routes};
use bindery_lua::StageName;

/// Options for a full pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Skip the test stage (the packaging helper's "nocheck" escape hatch)
    pub skip_test: bool,
}

/// Summary of a full pipeline run
#[derive(Debug, Default, Serialize)]
pub struct PipelineReport {
    pub cleaned: CleanStats,
    pub built: bool,
    pub docs_built: bool,
    pub tested: bool,
    pub installed: RouteStats,
}

/// Clean stage: external clean command, then derived sweep and scrub
pub fn run_clean(manifest: &Manifest) -> Result<CleanReport, CoreError> {
    if let Some(decl) = manifest.stage(StageName::Clean) {
        run_stage(decl, &manifest.project.env, &manifest.root)?;
    } else {
        debug!("no clean stage declared, sweeping only");
    }

    clean_tree(&manifest.root, &manifest.derived, &manifest.scrub, false)
}

/// Build stage: compile command, then docs/man generation
///
/// The docs command only runs after a successful build; a build failure
/// propagates before it is reached.
pub fn run_build(manifest: &Manifest) -> Result<(), CoreError> {
    if let Some(decl) = manifest.stage(StageName::Build) {
        run_stage(decl, &manifest.project.env, &manifest.root)?;
    } else {
        debug!("no build stage declared");
    }

    if let Some(decl) = manifest.stage(StageName::Docs) {
        run_stage(decl, &manifest.project.env, &manifest.root)?;
    } else {
        debug!("no docs stage declared");
    }

    Ok(())
}

/// Test stage: test runner with its declared environment overrides
pub fn run_test(manifest: &Manifest) -> Result<(), CoreError> {
    if let Some(decl) = manifest.stage(StageName::Test) {
        run_stage(decl, &manifest.project.env, &manifest.root)?;
    } else {
        debug!("no test stage declared");
    }

    Ok(())
}

/// Install stage: compute and apply the routing plan
pub fn run_install(manifest: &Manifest) -> Result<RouteStats, CoreError> {
    let plan = compute_routes(&manifest.root, &manifest.bundles)?;
    apply_routes(&plan)
}

/// Run the full pipeline in order, stopping at the first failure
pub fn run_pipeline(
    manifest: &Manifest,
    options: &PipelineOptions,
) -> Result<PipelineReport, CoreError> {
    let mut report = PipelineReport::default();

    let clean_report = run_clean(manifest)?;
    report.cleaned = clean_report.stats;

    run_build(manifest)?;
    report.built = manifest.stage(StageName::Build).is_some();
    report.docs_built = manifest.stage(StageName::Docs).is_some();

    if options.skip_test {
        info!("test stage skipped");
    } else {
        run_test(manifest)?;
        report.tested = manifest.stage(StageName::Test).is_some();
    }

    report.installed = run_install(manifest)?;

    info!(
        project = %manifest.project.name,
        files_copied = report.installed.files_copied,
        "pipeline complete"
    );

    Ok(report)
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use bindery_lua::{BundleDecl, RouteRule, StageDecl};
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn sh_stage(stage: StageName, script: &str) -> StageDecl {
        StageDecl {
            stage,
            run: vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()],
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    fn manifest_in(temp: &TempDir) -> Manifest {
        Manifest {
            root: temp.path().to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn docs_never_runs_after_failed_build() {
        let temp = TempDir::new().unwrap();
        let mut manifest = manifest_in(&temp);
        manifest.stages = vec![
            sh_stage(StageName::Build, "exit 1"),
            sh_stage(StageName::Docs, "touch docs.marker"),
        ];

        let err = run_build(&manifest).unwrap_err();
        assert!(matches!(err, CoreError::StageFailed { .. }));
        assert!(!temp.path().join("docs.marker").exists());
    }

    #[test]
    fn docs_runs_after_successful_build() {
        let temp = TempDir::new().unwrap();
        let mut manifest = manifest_in(&temp);
        manifest.stages = vec![
            sh_stage(StageName::Build, "touch build.marker"),
            sh_stage(StageName::Docs, "touch docs.marker"),
        ];

        run_build(&manifest).unwrap();
        assert!(temp.path().join("build.marker").exists());
        assert!(temp.path().join("docs.marker").exists());
    }

    #[test]
    fn pipeline_stops_before_install_on_test_failure() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("artifact.txt"), "x").unwrap();

        let mut manifest = manifest_in(&temp);
        manifest.stages = vec![sh_stage(StageName::Test, "exit 2")];
        manifest.bundles = vec![BundleDecl {
            name: "runtime".to_string(),
            root: temp.path().join("dist/runtime"),
            rules: vec![RouteRule {
                glob: Some("artifact.txt".to_string()),
                file: None,
                to: PathBuf::from("usr/share"),
            }],
            purge: vec![],
            keep: None,
        }];

        let err = run_pipeline(&manifest, &PipelineOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(!temp.path().join("dist/runtime").exists());
    }

    #[test]
    fn skip_test_bypasses_test_stage() {
        let temp = TempDir::new().unwrap();
        let mut manifest = manifest_in(&temp);
        manifest.stages = vec![sh_stage(StageName::Test, "touch tested.marker")];

        let options = PipelineOptions { skip_test: true };
        let report = run_pipeline(&manifest, &options).unwrap();

        assert!(!report.tested);
        assert!(!temp.path().join("tested.marker").exists());
    }

    #[test]
    fn full_pipeline_builds_and_installs() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("gen.pyx"), "source").unwrap();
        std::fs::write(temp.path().join("gen.c"), "stale derived").unwrap();

        let mut manifest = manifest_in(&temp);
        manifest.derived = vec![bindery_lua::DerivedDecl {
            from: "pyx".to_string(),
            strip: vec!["c".to_string()],
        }];
        manifest.stages = vec![
            sh_stage(StageName::Build, "mkdir -p out && echo elf > out/fast.so"),
            sh_stage(StageName::Test, "test -f out/fast.so"),
        ];
        manifest.bundles = vec![BundleDecl {
            name: "runtime".to_string(),
            root: temp.path().join("dist/runtime"),
            rules: vec![RouteRule {
                glob: Some("out/*.so".to_string()),
                file: None,
                to: PathBuf::from("usr/lib"),
            }],
            purge: vec![],
            keep: None,
        }];

        let report = run_pipeline(&manifest, &PipelineOptions::default()).unwrap();

        assert_eq!(report.cleaned.derived_removed, 1);
        assert!(report.built);
        assert!(report.tested);
        assert_eq!(report.installed.files_copied, 1);
        assert!(!temp.path().join("gen.c").exists());
        assert!(temp.path().join("dist/runtime/usr/lib/fast.so").exists());
    }
}
