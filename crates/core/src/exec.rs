//! External stage command execution
//!
//! Each pipeline stage is a blocking subprocess. The child inherits the
//! process environment (the external build helpers need PATH and friends),
//! with the project environment applied on top and stage-specific
//! overrides taking final precedence. Output streams straight through to
//! the terminal; bindery only cares about the exit status.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

use crate::error::CoreError;
use bindery_lua::StageDecl;

/// Run a declared stage command to completion
///
/// The working directory defaults to the build tree root. A non-zero exit
/// status is fatal and carries the child's exit code for propagation.
pub fn run_stage(
    decl: &StageDecl,
    project_env: &BTreeMap<String, String>,
    root: &Path,
) -> Result<(), CoreError> {
    info!(stage = %decl.stage, cmd = ?decl.run, "running stage command");

    let program = &decl.run[0];
    let working_dir = decl.cwd.as_deref().unwrap_or(root);

    let mut command = Command::new(program);
    command.args(&decl.run[1..]).current_dir(working_dir);

    for (key, value) in project_env {
        command.env(key, value);
    }
    // Stage overrides win over project env
    for (key, value) in &decl.env {
        command.env(key, value);
    }

    debug!(program = %program, working_dir = %working_dir.display(), "spawning process");

    let status = command.status().map_err(|source| CoreError::Spawn {
        stage: decl.stage.to_string(),
        program: program.clone(),
        source,
    })?;

    if !status.success() {
        return Err(CoreError::StageFailed {
            stage: decl.stage.to_string(),
            code: status.code(),
        });
    }

    Ok(())
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use bindery_lua::StageName;
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

    #[test]
    fn run_simple_command() {
        let temp = TempDir::new().unwrap();
        let decl = sh_stage(StageName::Build, "touch built.marker");

        run_stage(&decl, &BTreeMap::new(), temp.path()).unwrap();

        assert!(temp.path().join("built.marker").exists());
    }

    #[test]
    fn run_with_project_env() {
        let temp = TempDir::new().unwrap();
        let decl = sh_stage(StageName::Build, r#"printf '%s' "$PYBUILD_NAME" > name.txt"#);

        let mut project_env = BTreeMap::new();
        project_env.insert("PYBUILD_NAME".to_string(), "silx".to_string());

        run_stage(&decl, &project_env, temp.path()).unwrap();

        assert_eq!(
            std::fs::read_to_string(temp.path().join("name.txt")).unwrap(),
            "silx"
        );
    }

    #[test]
    fn stage_env_overrides_project_env() {
        let temp = TempDir::new().unwrap();
        let mut decl = sh_stage(StageName::Test, r#"printf '%s' "$WITH_QT_TEST" > flag.txt"#);
        decl.env
            .insert("WITH_QT_TEST".to_string(), "False".to_string());

        let mut project_env = BTreeMap::new();
        project_env.insert("WITH_QT_TEST".to_string(), "True".to_string());

        run_stage(&decl, &project_env, temp.path()).unwrap();

        assert_eq!(
            std::fs::read_to_string(temp.path().join("flag.txt")).unwrap(),
            "False"
        );
    }

    #[test]
    fn run_with_cwd() {
        let temp = TempDir::new().unwrap();
        let sub = temp.path().join("sub");
        std::fs::create_dir(&sub).unwrap();

        let mut decl = sh_stage(StageName::Build, "touch here.marker");
        decl.cwd = Some(sub.clone());

        run_stage(&decl, &BTreeMap::new(), temp.path()).unwrap();

        assert!(sub.join("here.marker").exists());
    }

    #[test]
    fn failure_carries_exit_code() {
        let temp = TempDir::new().unwrap();
        let decl = sh_stage(StageName::Build, "exit 3");

        let err = run_stage(&decl, &BTreeMap::new(), temp.path()).unwrap_err();

        match err {
            CoreError::StageFailed { stage, code } => {
                assert_eq!(stage, "build");
                assert_eq!(code, Some(3));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            CoreError::StageFailed {
                stage: "build".to_string(),
                code: Some(3)
            }
            .exit_code(),
            3
        );
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let temp = TempDir::new().unwrap();
        let decl = StageDecl {
            stage: StageName::Build,
            run: vec!["bindery-no-such-program".to_string()],
            env: BTreeMap::new(),
            cwd: None,
        };

        let err = run_stage(&decl, &BTreeMap::new(), temp.path()).unwrap_err();
        assert!(matches!(err, CoreError::Spawn { .. }));
    }

    #[test]
    fn cwd_from_decl_is_absolute() {
        // cwd is resolved against the tree root at declaration time, so by
        // the time it reaches exec it is already absolute
        let decl = StageDecl {
            stage: StageName::Build,
            run: vec!["true".to_string()],
            env: BTreeMap::new(),
            cwd: Some(PathBuf::from("/tmp")),
        };
        assert!(decl.cwd.as_ref().unwrap().is_absolute());
    }
}
