//! Testinfra verifier
//!
//! Discovers `test_*.py` files in the test directory, lints them with flake8
//! and runs them with testinfra. Verifier options are resolved once, when the
//! verifier is built, and reused by every pass.

use super::report::{StepResult, VerificationReport};
use super::{Verifier, VerifyPhase};
use crate::compiler::{EnvMap, Invocation};
use crate::error::{ConfigResult, VerifyError, VerifyResult};
use crate::executor::{Executor, Outcome, OutputSink, ProcessSpawner, SystemSpawner};
use crate::options::{default_options, options_layer, resolve, ResolvedOptions};
use crate::tool::{Tool, ToolPaths};
use crate::value::ConfigMap;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::time::Instant;

const TEST_FILE_PREFIX: &str = "test_";
const TEST_FILE_EXTENSION: &str = "py";

/// Inputs needed to resolve testinfra options
#[derive(Debug, Clone, Default)]
pub struct VerifierContext {
    /// Ambient environment, copied once
    pub environment: EnvMap,
    /// The `ansible` configuration section
    pub ansible: ConfigMap,
    /// Driver-specific testinfra options (connection backend, inventory)
    pub driver_options: ConfigMap,
    /// The `verifier` configuration section (`testdir`, `options`)
    pub user_options: ConfigMap,
    pub debug: bool,
    pub sudo: bool,
    pub tools: ToolPaths,
    /// Directory `testdir` is relative to
    pub project_dir: PathBuf,
}

/// Runs flake8 and testinfra over discovered test files
pub struct Testinfra<S = SystemSpawner> {
    options: ResolvedOptions,
    testdir: PathBuf,
    /// Working directory for both tools; discovered files are passed
    /// relative to it
    project_dir: PathBuf,
    environment: EnvMap,
    tools: ToolPaths,
    executor: Executor<S>,
}

impl Testinfra<SystemSpawner> {
    pub fn new(ctx: VerifierContext) -> ConfigResult<Self> {
        Self::with_spawner(ctx, SystemSpawner)
    }
}

impl<S: ProcessSpawner> Testinfra<S> {
    pub fn with_spawner(ctx: VerifierContext, spawner: S) -> ConfigResult<Self> {
        let defaults = default_options(
            &ctx.environment,
            &ctx.ansible,
            ctx.debug,
            ctx.sudo,
            &ConfigMap::new(),
        )?;
        let options = resolve(
            &defaults,
            &options_layer(ctx.driver_options),
            &ctx.user_options,
        )?;
        // catch a malformed options.env now rather than mid-pass
        options.env()?;

        let project_dir = if ctx.project_dir.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            ctx.project_dir
        };

        Ok(Self {
            testdir: project_dir.join(&options.testdir),
            project_dir,
            options,
            environment: ctx.environment,
            tools: ctx.tools,
            executor: Executor::new(spawner),
        })
    }

    pub fn options(&self) -> &ResolvedOptions {
        &self.options
    }

    pub fn executor(&self) -> &Executor<S> {
        &self.executor
    }

    /// `test_*.py` files directly inside the test directory, sorted.
    ///
    /// A missing directory yields no files.
    pub fn discover(&self) -> Vec<PathBuf> {
        let walker = WalkBuilder::new(&self.testdir)
            .standard_filters(false)
            .max_depth(Some(1))
            .build();

        let mut files: Vec<PathBuf> = walker
            .flatten()
            .map(|entry| entry.into_path())
            .filter(|path| path.is_file() && is_test_file(path))
            .collect();
        files.sort();
        files
    }

    /// The flake8 invocation for `files`
    pub fn lint_invocation(&self, files: &[PathBuf]) -> Invocation {
        Invocation::new(Tool::Flake8, &self.tools.flake8, self.environment.clone())
            .with_positional(self.relative_paths(files))
            .with_working_dir(&self.project_dir)
    }

    /// The testinfra invocation for `files`.
    ///
    /// `options.env` becomes the environment (with the ambient `HOME` added
    /// when missing); every other option becomes a flag.
    pub fn test_invocation(&self, files: &[PathBuf]) -> ConfigResult<Invocation> {
        let mut env = self.options.env()?;
        if !env.contains_key("HOME") {
            if let Some(home) = self.environment.get("HOME") {
                env.insert("HOME".to_string(), home.clone());
            }
        }

        let mut invocation = Invocation::new(Tool::Testinfra, &self.tools.testinfra, env)
            .with_positional(self.relative_paths(files))
            .with_working_dir(&self.project_dir);
        for (name, value) in self.options.flags() {
            invocation = invocation.with_flag(name, value.clone());
        }
        Ok(invocation)
    }

    fn relative_paths(&self, files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|p| {
                p.strip_prefix(&self.project_dir)
                    .unwrap_or(p)
                    .display()
                    .to_string()
            })
            .collect()
    }

    fn lint(&self, files: &[PathBuf], sink: &mut dyn OutputSink) -> VerifyResult<StepResult> {
        tracing::info!(
            "Executing flake8 on *.py files found in {}/.",
            self.options.testdir
        );
        let started = Instant::now();
        let outcome = self
            .executor
            .execute(&self.lint_invocation(files), sink, false)?;

        if let Outcome::Failure { exit_code } = outcome {
            return Err(VerifyError::LintFailed {
                testdir: PathBuf::from(&self.options.testdir),
                exit_code,
            });
        }
        Ok(StepResult::from_outcome("lint", &outcome, started.elapsed()))
    }
}

impl<S: ProcessSpawner> Verifier for Testinfra<S> {
    fn name(&self) -> &'static str {
        "testinfra"
    }

    fn testdir(&self) -> &Path {
        &self.testdir
    }

    fn execute(&self, sink: &mut dyn OutputSink) -> VerifyResult<VerificationReport> {
        let start = Instant::now();
        let mut report = VerificationReport::new(self.name(), &self.options.testdir);

        report.enter(VerifyPhase::Discovering);
        let files = self.discover();
        if files.is_empty() {
            tracing::warn!(
                testdir = %self.testdir.display(),
                "No testinfra tests found, skipping verification"
            );
            report.enter(VerifyPhase::Skipped);
            report.add_step(StepResult::skipped("lint"));
            report.add_step(StepResult::skipped("test"));
            report.finalize(start.elapsed());
            return Ok(report);
        }

        tracing::info!(files = files.len(), testdir = %self.options.testdir, "Discovered tests");
        report.files = files.clone();
        report.enter(VerifyPhase::Verifying);

        let lint = self.lint(&files, sink)?;
        report.add_step(lint);

        tracing::info!(
            "Executing testinfra tests found in {}/.",
            self.options.testdir
        );
        let invocation = self.test_invocation(&files)?;
        let started = Instant::now();
        let outcome = self.executor.execute(&invocation, sink, false)?;
        report.add_step(StepResult::from_outcome("test", &outcome, started.elapsed()));
        report.outcome = outcome;

        report.finalize(start.elapsed());
        tracing::info!(summary = %report.summary(), "Verification finished");
        Ok(report)
    }
}

fn is_test_file(path: &Path) -> bool {
    let has_extension = path.extension().and_then(|e| e.to_str()) == Some(TEST_FILE_EXTENSION);
    let has_prefix = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(TEST_FILE_PREFIX));
    has_extension && has_prefix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecutionError;
    use crate::executor::testing::{FakeSpawner, RecordingSink, Script};
    use crate::value::ConfigValue;
    use std::fs;
    use tempfile::TempDir;

    fn project(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "def test_ok(): pass\n").unwrap();
        }
        dir
    }

    fn context(dir: &TempDir) -> VerifierContext {
        let environment: EnvMap = [
            ("FOO".to_string(), "bar".to_string()),
            ("HOME".to_string(), "/home/tester".to_string()),
        ]
        .into_iter()
        .collect();
        let ansible: ConfigMap = [
            ("config_file", ConfigValue::from("test/config_file")),
            ("host_key_checking", ConfigValue::Bool(false)),
            (
                "raw_ssh_args",
                ConfigValue::from(vec!["-o UserKnownHostsFile=/dev/null", "-o IdentitiesOnly=yes"]),
            ),
        ]
        .into_iter()
        .collect();
        let driver_options: ConfigMap = [
            ("ansible-inventory", "test/inventory_file"),
            ("connection", "ansible"),
        ]
        .into_iter()
        .collect();

        VerifierContext {
            environment,
            ansible,
            driver_options,
            project_dir: dir.path().to_path_buf(),
            ..Default::default()
        }
    }

    fn verifier(dir: &TempDir, scripts: Vec<Script>) -> Testinfra<FakeSpawner> {
        Testinfra::with_spawner(context(dir), FakeSpawner::new(scripts)).unwrap()
    }

    #[test]
    fn test_default_testdir() {
        let dir = project(&[]);
        let v = verifier(&dir, vec![]);
        assert_eq!(v.options().testdir, "tests");
        assert_eq!(v.testdir(), dir.path().join("tests"));
    }

    #[test]
    fn test_discover_matches_only_top_level_test_files() {
        let dir = project(&[
            "tests/test_b.py",
            "tests/test_a.py",
            "tests/conftest.py",
            "tests/test_notes.txt",
            "tests/nested/test_c.py",
        ]);
        let v = verifier(&dir, vec![]);

        let names: Vec<String> = v
            .discover()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["test_a.py", "test_b.py"]);
    }

    #[test]
    fn test_no_tests_skips_both_tools() {
        let dir = project(&[]);
        let v = verifier(&dir, vec![]);

        let report = v.execute(&mut RecordingSink::default()).unwrap();

        assert!(v.executor().spawner().requests.borrow().is_empty());
        assert!(report.skipped());
        assert!(report.outcome.is_success());
        assert_eq!(
            report.phases,
            vec![
                VerifyPhase::Idle,
                VerifyPhase::Discovering,
                VerifyPhase::Skipped,
                VerifyPhase::Done
            ]
        );
    }

    #[test]
    fn test_lint_failure_aborts_before_testinfra() {
        let dir = project(&["tests/test_a.py", "tests/test_b.py"]);
        let v = verifier(&dir, vec![Script::fail(1), Script::ok(&[])]);

        let err = v.execute(&mut RecordingSink::default()).unwrap_err();

        assert!(matches!(err, VerifyError::LintFailed { exit_code: 1, .. }));
        assert_eq!(v.executor().spawner().programs(), vec!["flake8"]);
    }

    #[test]
    fn test_execute_runs_flake8_then_testinfra() {
        let dir = project(&["tests/test_a.py", "tests/test_b.py"]);
        let v = verifier(&dir, vec![Script::ok(&[]), Script::ok(&["2 passed"])]);

        let report = v.execute(&mut RecordingSink::default()).unwrap();

        assert_eq!(report.outcome.clone().into_pair(), (None, Some("2 passed\n".to_string())));
        assert_eq!(report.phase(), VerifyPhase::Done);
        assert!(report.phases.contains(&VerifyPhase::Verifying));

        let requests = v.executor().spawner().requests.borrow();
        assert_eq!(requests.len(), 2);
        let files = ["tests/test_a.py", "tests/test_b.py"];
        assert_eq!(requests[0].program, "flake8");
        assert_eq!(requests[0].args, files);
        assert_eq!(requests[0].working_dir.as_deref(), Some(dir.path()));
        assert_eq!(requests[1].working_dir.as_deref(), Some(dir.path()));

        let testinfra = &requests[1];
        assert_eq!(testinfra.program, "testinfra");
        assert_eq!(testinfra.args[..2], files[..]);
        assert_eq!(
            testinfra.args[2..],
            ["--ansible-inventory=test/inventory_file", "--connection=ansible"]
        );

        let env = &testinfra.env;
        assert_eq!(env["FOO"], "bar");
        assert_eq!(env["PYTHONUNBUFFERED"], "1");
        assert_eq!(env["ANSIBLE_FORCE_COLOR"], "true");
        assert_eq!(env["ANSIBLE_CONFIG"], "test/config_file");
        assert_eq!(env["ANSIBLE_HOST_KEY_CHECKING"], "false");
        assert_eq!(
            env["ANSIBLE_SSH_ARGS"],
            "-o UserKnownHostsFile=/dev/null -o IdentitiesOnly=yes"
        );
    }

    #[test]
    fn test_user_overrides_enable_debug_and_sudo() {
        let dir = project(&["tests/test_a.py"]);
        let mut ctx = context(&dir);
        ctx.user_options = options_layer(
            [("sudo", true), ("debug", true)].into_iter().collect(),
        );
        let v = Testinfra::with_spawner(ctx, FakeSpawner::new([Script::ok(&[]), Script::ok(&[])]))
            .unwrap();

        v.execute(&mut RecordingSink::default()).unwrap();

        let requests = v.executor().spawner().requests.borrow();
        assert!(requests[1].args.contains(&"--debug".to_string()));
        assert!(requests[1].args.contains(&"--sudo".to_string()));
    }

    #[test]
    fn test_user_env_override_still_gets_home() {
        let dir = project(&["tests/test_a.py"]);
        let mut ctx = context(&dir);
        let env: ConfigMap = [("ONLY", "this")].into_iter().collect();
        ctx.user_options = options_layer([("env", env)].into_iter().collect());
        let v = verifier_from(ctx);

        let invocation = v.test_invocation(&v.discover()).unwrap();
        assert_eq!(invocation.environment().len(), 2);
        assert_eq!(invocation.environment()["HOME"], "/home/tester");
        assert_eq!(invocation.environment()["ONLY"], "this");
    }

    #[test]
    fn test_failing_tests_are_an_outcome_not_an_error() {
        let dir = project(&["tests/test_a.py"]);
        let v = verifier(&dir, vec![Script::ok(&[]), Script::fail(1)]);

        let report = v.execute(&mut RecordingSink::default()).unwrap();

        assert_eq!(report.outcome.exit_code(), Some(1));
        assert_eq!(report.summary().split_whitespace().next(), Some("[RED]"));
    }

    #[test]
    fn test_missing_testinfra_binary_is_an_error() {
        let dir = project(&["tests/test_a.py"]);
        let v = verifier(&dir, vec![Script::ok(&[]), Script::Missing]);

        let err = v.execute(&mut RecordingSink::default()).unwrap_err();
        assert!(matches!(
            err,
            VerifyError::Execution(ExecutionError::Spawn { ref program, .. }) if program == "testinfra"
        ));
    }

    #[test]
    fn test_custom_testdir_from_user_options() {
        let dir = project(&["spec/test_web.py"]);
        let mut ctx = context(&dir);
        ctx.user_options = [("testdir", "spec")].into_iter().collect();
        let v = verifier_from(ctx);

        assert_eq!(v.options().testdir, "spec");
        assert_eq!(v.discover().len(), 1);
    }

    #[test]
    fn test_empty_project_dir_runs_from_current_dir() {
        let v = verifier_from(VerifierContext::default());
        let files = vec![PathBuf::from("./tests/test_a.py")];

        let lint = v.lint_invocation(&files);
        assert_eq!(lint.working_dir(), Some(Path::new(".")));
        assert_eq!(lint.positional(), ["tests/test_a.py"]);
        assert_eq!(
            v.test_invocation(&files).unwrap().working_dir(),
            Some(Path::new("."))
        );
    }

    fn verifier_from(ctx: VerifierContext) -> Testinfra<FakeSpawner> {
        Testinfra::with_spawner(ctx, FakeSpawner::default()).unwrap()
    }
}
