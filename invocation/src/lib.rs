//! Invocation Library
//!
//! Drives ansible-playbook, flake8 and testinfra as subprocesses, turning
//! loosely-typed YAML configuration into the exact arguments and environment
//! each tool expects.
//!
//! # Pipeline
//!
//! ```text
//! config → options (merge) → compiler (args/env) → executor (run, classify) → outcome
//! ```
//!
//! - [`rules`]: which configuration keys become environment variables,
//!   positionals or flags
//! - [`compiler`]: builds an [`Invocation`] from a configuration section
//! - [`executor`]: runs invocations, streaming output to an [`OutputSink`]
//! - [`options`]: merges layered verifier options
//! - [`verifier`]: test discovery, flake8 gate, testinfra run
//!
//! Everything here is synchronous. A tool that never exits blocks its
//! caller; there is no timeout.

#![allow(clippy::uninlined_format_args)]

pub mod compiler;
pub mod error;
pub mod executor;
pub mod options;
pub mod rules;
pub mod tool;
pub mod value;
pub mod verifier;

pub use compiler::{EnvMap, Invocation, InvocationCompiler};
pub use error::{
    ConfigResult, ConfigurationError, ExecResult, ExecutionError, VerifyError, VerifyResult,
};
pub use executor::{Executor, Outcome, OutputSink, ProcessSpawner, SystemSpawner, TracingSink};
pub use options::{default_options, resolve, ResolvedOptions, DEFAULT_TESTDIR};
pub use tool::{Tool, ToolPaths};
pub use value::{ConfigMap, ConfigValue};
pub use verifier::{
    StepOutcome, Testinfra, VerificationReport, Verifier, VerifierContext, VerifyPhase,
};
