//! Verifier Module — test-file discovery, linting and test execution
//!
//! A verification pass moves through a fixed set of phases:
//!
//! ```text
//! Idle → Discovering → Skipped ──→ Done
//!                    ↘ Verifying ↗
//! ```
//!
//! With no test files the pass is skipped and counts as a success. Otherwise
//! flake8 runs over the files first; a lint failure aborts the pass before
//! testinfra starts.
//!
//! # Usage
//!
//! ```rust,ignore
//! use invocation::verifier::{Testinfra, Verifier, VerifierContext};
//!
//! let verifier = Testinfra::new(ctx)?;
//! let report = verifier.execute(&mut TracingSink)?;
//! println!("{}", report.summary());
//! ```

pub mod report;
pub mod testinfra;

pub use report::{StepOutcome, StepResult, VerificationReport};
pub use testinfra::{Testinfra, VerifierContext};

use crate::error::VerifyResult;
use crate::executor::OutputSink;
use serde::Serialize;
use std::path::Path;

/// Phase of a verification pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyPhase {
    Idle,
    Discovering,
    Skipped,
    Verifying,
    Done,
}

/// A test-running strategy
pub trait Verifier {
    /// Name used in logs and reports
    fn name(&self) -> &'static str;

    /// Directory searched for test files
    fn testdir(&self) -> &Path;

    /// Run one verification pass.
    ///
    /// A failing test run is reported through the report's outcome; only
    /// lint failures and configuration/spawn problems are errors.
    fn execute(&self, sink: &mut dyn OutputSink) -> VerifyResult<VerificationReport>;
}
