//! Integration tests for the testinfra verifier
//!
//! Standard utilities stand in for the real tools: `true`/`false` for
//! flake8 and `echo` for testinfra, so the "test output" is the argument
//! list testinfra would have received.

#![cfg(unix)]

use invocation::{
    ConfigMap, ConfigValue, EnvMap, Testinfra, ToolPaths, TracingSink, Verifier, VerifierContext,
    VerifyError, VerifyPhase,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn project(tests: &[&str]) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("tests")).unwrap();
    for name in tests {
        fs::write(dir.path().join("tests").join(name), "def test_ok(): pass\n").unwrap();
    }
    dir
}

fn context(project_dir: &Path, flake8: &str) -> VerifierContext {
    let environment: EnvMap = std::env::vars().collect();
    let driver_options: ConfigMap = [("connection", "docker")].into_iter().collect();
    let ansible: ConfigMap = [("host_key_checking", ConfigValue::Bool(false))]
        .into_iter()
        .collect();

    VerifierContext {
        environment,
        ansible,
        driver_options,
        sudo: true,
        tools: ToolPaths {
            flake8: flake8.to_string(),
            testinfra: "echo".to_string(),
            ..ToolPaths::default()
        },
        project_dir: project_dir.to_path_buf(),
        ..Default::default()
    }
}

#[test]
fn test_verify_runs_testinfra_with_resolved_flags() {
    let dir = project(&["test_default.py"]);
    let verifier = Testinfra::new(context(dir.path(), "true")).unwrap();

    let report = verifier.execute(&mut TracingSink).unwrap();

    let (code, stdout) = report.outcome.clone().into_pair();
    assert_eq!(code, None);
    let stdout = stdout.unwrap();
    assert!(stdout.starts_with("tests/test_default.py "));
    assert!(stdout.contains("--connection=docker"));
    assert!(stdout.contains("--sudo"));
    assert!(!stdout.contains("--debug"));
    assert_eq!(report.phase(), VerifyPhase::Done);
    assert_eq!(report.steps.len(), 2);
}

#[test]
fn test_lint_failure_aborts_pass() {
    let dir = project(&["test_default.py"]);
    let verifier = Testinfra::new(context(dir.path(), "false")).unwrap();

    let err = verifier.execute(&mut TracingSink).unwrap_err();
    assert!(matches!(err, VerifyError::LintFailed { exit_code: 1, .. }));
}

#[test]
fn test_no_tests_never_touches_tools() {
    let dir = project(&["helpers.py"]);
    let verifier =
        Testinfra::new(context(dir.path(), "/nonexistent/playcheck-flake8")).unwrap();

    let report = verifier.execute(&mut TracingSink).unwrap();

    assert!(report.skipped());
    assert!(report.outcome.is_success());
    assert!(report.files.is_empty());
}
