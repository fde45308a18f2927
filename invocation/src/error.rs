//! Invocation error types
//!
//! Three failure classes exist and they propagate differently:
//!
//! - [`ConfigurationError`]: the configuration cannot be turned into an
//!   invocation. Nothing is executed.
//! - [`ExecutionError`]: the external binary could not be spawned at all.
//!   No outcome is produced.
//! - [`VerifyError`]: a verification pass was aborted, either by one of the
//!   above or because the style linter rejected the test files.
//!
//! A tool that runs and exits non-zero is *not* an error. It is reported as
//! [`crate::Outcome::Failure`] so callers decide whether it halts anything.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for configuration handling
pub type ConfigResult<T> = Result<T, ConfigurationError>;

/// Result type alias for process execution
pub type ExecResult<T> = Result<T, ExecutionError>;

/// Result type alias for verification passes
pub type VerifyResult<T> = Result<T, VerifyError>;

/// The configuration cannot be compiled into an invocation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// `compile()` was called before a playbook was set
    #[error("No playbook configured; ansible-playbook needs a playbook path")]
    MissingSubject,

    /// A rewrite rule received a value kind it does not accept
    #[error("Invalid value for '{key}': expected {expected}, found {found}")]
    UnexpectedKind {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl ConfigurationError {
    pub(crate) fn unexpected(
        key: impl Into<String>,
        expected: &'static str,
        found: &'static str,
    ) -> Self {
        Self::UnexpectedKind {
            key: key.into(),
            expected,
            found,
        }
    }
}

/// The external process could not be started
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Binary missing, not executable, or the fork itself failed
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on or reading from the child failed after it started
    #[error("Lost track of '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// A verification pass was aborted
#[derive(Error, Debug)]
pub enum VerifyError {
    /// flake8 rejected the discovered test files; testinfra was not started
    #[error("flake8 failed on tests in {testdir} (exit code {exit_code})")]
    LintFailed { testdir: PathBuf, exit_code: i32 },

    /// The resolved options could not be expanded into an invocation
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// One of the tools could not be spawned
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_kind_message() {
        let err = ConfigurationError::unexpected("raw_ssh_args", "a list", "a mapping");
        assert_eq!(
            err.to_string(),
            "Invalid value for 'raw_ssh_args': expected a list, found a mapping"
        );
    }

    #[test]
    fn test_verify_error_wraps_configuration_error() {
        let err: VerifyError = ConfigurationError::MissingSubject.into();
        assert!(matches!(
            err,
            VerifyError::Configuration(ConfigurationError::MissingSubject)
        ));
    }

    #[test]
    fn test_lint_failed_message_names_testdir() {
        let err = VerifyError::LintFailed {
            testdir: PathBuf::from("tests"),
            exit_code: 1,
        };
        assert_eq!(
            err.to_string(),
            "flake8 failed on tests in tests (exit code 1)"
        );
    }
}
