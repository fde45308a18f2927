//! Project — a loaded `molecule.yml` plus the ambient process state
//! the subcommands need (environment, tool binaries, base directory).

use crate::config::ProjectConfig;
use crate::driver::Driver;
use anyhow::{Context, Result};
use invocation::{
    EnvMap, Executor, InvocationCompiler, Outcome, OutputSink, Testinfra, ToolPaths,
    VerificationReport, Verifier, VerifierContext,
};
use std::path::{Path, PathBuf};

pub struct Project {
    pub config: ProjectConfig,
    pub driver: Driver,
    /// Directory holding the project file; relative paths resolve against it
    pub dir: PathBuf,
    pub environment: EnvMap,
    pub tools: ToolPaths,
}

impl Project {
    /// Load the project file and snapshot the current process environment.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config = ProjectConfig::load(config_path)?;
        Ok(Self::new(config, config_path, std::env::vars().collect()))
    }

    pub fn new(config: ProjectConfig, config_path: &Path, environment: EnvMap) -> Self {
        let dir = match config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let driver = Driver::from_name(config.driver.name.as_deref());
        let tools = ToolPaths::from_env(&environment);
        Self {
            config,
            driver,
            dir,
            environment,
            tools,
        }
    }

    pub fn verifier_context(&self, debug: bool, sudo: bool) -> Result<VerifierContext> {
        let ansible = self.config.ansible()?;
        Ok(VerifierContext {
            environment: self.environment.clone(),
            driver_options: self.driver.testinfra_args(&ansible),
            ansible,
            user_options: self.config.verifier_layer()?,
            debug,
            sudo,
            tools: self.tools.clone(),
            project_dir: self.dir.clone(),
        })
    }

    pub fn verifier(&self, debug: bool, sudo: bool) -> Result<Testinfra> {
        let ctx = self.verifier_context(debug, sudo)?;
        Testinfra::new(ctx).context("Invalid verifier options")
    }

    /// Lint and run the test suite.
    pub fn verify(
        &self,
        debug: bool,
        sudo: bool,
        sink: &mut dyn OutputSink,
    ) -> Result<VerificationReport> {
        let verifier = self.verifier(debug, sudo)?;
        tracing::info!(
            verifier = verifier.name(),
            driver = self.driver.name(),
            "Verifying"
        );
        Ok(verifier.execute(sink)?)
    }

    /// Run ansible-playbook against the configured playbook.
    pub fn converge(&self, hide_errors: bool, sink: &mut dyn OutputSink) -> Result<Outcome> {
        let mut compiler = InvocationCompiler::new(self.environment.clone())
            .with_program(self.tools.ansible_playbook.as_str());
        compiler
            .apply_all(&self.config.playbook_config()?)
            .context("Invalid ansible configuration")?;
        let invocation = compiler.compile()?.with_working_dir(&self.dir);

        tracing::info!(command = %invocation.command_line(), "Converging");
        let outcome = Executor::system().execute(&invocation, sink, hide_errors)?;
        Ok(outcome)
    }

    /// Resolved verifier options as pretty JSON
    pub fn show_options(&self, debug: bool, sudo: bool) -> Result<String> {
        let verifier = self.verifier(debug, sudo)?;
        serde_json::to_string_pretty(verifier.options()).context("Failed to render options")
    }
}

/// Process exit status for a finished tool run
pub fn exit_status(outcome: &Outcome) -> u8 {
    match outcome.exit_code() {
        None => 0,
        Some(code) => u8::try_from(code).ok().filter(|c| *c != 0).unwrap_or(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invocation::{ConfigValue, DEFAULT_TESTDIR};

    fn project(yaml: &str, path: &str) -> Project {
        let config = ProjectConfig::from_yaml_str(yaml).unwrap();
        let env: EnvMap = [("HOME".to_string(), "/home/ci".to_string())]
            .into_iter()
            .collect();
        Project::new(config, Path::new(path), env)
    }

    #[test]
    fn test_dir_defaults_to_current() {
        assert_eq!(project("", "molecule.yml").dir, PathBuf::from("."));
        assert_eq!(
            project("", "roles/web/molecule.yml").dir,
            PathBuf::from("roles/web")
        );
    }

    #[test]
    fn test_verifier_context_layers() {
        let p = project(
            "driver:\n  name: docker\nverifier:\n  testdir: spec\n",
            "molecule.yml",
        );
        let ctx = p.verifier_context(true, false).unwrap();

        assert!(ctx.debug);
        assert_eq!(
            ctx.driver_options.get("connection"),
            Some(&ConfigValue::from("docker"))
        );
        assert_eq!(
            ctx.user_options.get("testdir"),
            Some(&ConfigValue::from("spec"))
        );
    }

    #[test]
    fn test_show_options_renders_resolved_json() {
        let p = project("", "molecule.yml");
        let json: serde_json::Value =
            serde_json::from_str(&p.show_options(false, true).unwrap()).unwrap();

        assert_eq!(json["testdir"], DEFAULT_TESTDIR);
        assert_eq!(json["options"]["sudo"], true);
        assert_eq!(json["options"]["connection"], "ansible");
        assert_eq!(
            json["options"]["ansible-inventory"],
            ".molecule/ansible_inventory"
        );
        assert_eq!(json["options"]["env"]["PYTHONUNBUFFERED"], "1");
    }

    #[test]
    fn test_exit_status() {
        assert_eq!(
            exit_status(&Outcome::Success {
                stdout: String::new()
            }),
            0
        );
        assert_eq!(exit_status(&Outcome::Failure { exit_code: 2 }), 2);
        assert_eq!(exit_status(&Outcome::Failure { exit_code: -9 }), 1);
        assert_eq!(exit_status(&Outcome::Failure { exit_code: 256 }), 1);
    }
}
