//! Verification Report — structured output from one verification pass

use crate::executor::Outcome;
use crate::verifier::VerifyPhase;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Outcome of a single step (lint or test)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Passed,
    Failed,
    /// No test files were found
    Skipped,
}

impl StepOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

impl std::fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "PASS"),
            Self::Failed => write!(f, "FAIL"),
            Self::Skipped => write!(f, "SKIP"),
        }
    }
}

/// Result of one step
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    /// Step name (lint, test)
    pub step: String,
    pub outcome: StepOutcome,
    pub duration_ms: u64,
    pub exit_code: Option<i32>,
}

impl StepResult {
    pub fn from_outcome(step: &str, outcome: &Outcome, duration: Duration) -> Self {
        Self {
            step: step.to_string(),
            outcome: if outcome.is_success() {
                StepOutcome::Passed
            } else {
                StepOutcome::Failed
            },
            duration_ms: duration.as_millis() as u64,
            exit_code: outcome.exit_code(),
        }
    }

    pub fn skipped(step: &str) -> Self {
        Self {
            step: step.to_string(),
            outcome: StepOutcome::Skipped,
            duration_ms: 0,
            exit_code: None,
        }
    }
}

/// Complete report for one verification pass
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub timestamp: DateTime<Utc>,
    pub total_duration_ms: u64,
    /// Verifier that produced the report
    pub verifier: String,
    pub testdir: String,
    /// Discovered test files, sorted
    pub files: Vec<PathBuf>,
    /// Every phase the pass went through, in order
    pub phases: Vec<VerifyPhase>,
    pub steps: Vec<StepResult>,
    /// The test runner's outcome; success when skipped
    pub outcome: Outcome,
}

impl VerificationReport {
    pub fn new(verifier: &str, testdir: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            total_duration_ms: 0,
            verifier: verifier.to_string(),
            testdir: testdir.to_string(),
            files: Vec::new(),
            phases: vec![VerifyPhase::Idle],
            steps: Vec::new(),
            outcome: Outcome::Success {
                stdout: String::new(),
            },
        }
    }

    pub(crate) fn enter(&mut self, phase: VerifyPhase) {
        tracing::debug!(verifier = %self.verifier, ?phase, "Verification phase");
        self.phases.push(phase);
    }

    pub fn phase(&self) -> VerifyPhase {
        self.phases.last().copied().unwrap_or(VerifyPhase::Idle)
    }

    /// True when no test files were found and both steps were skipped
    pub fn skipped(&self) -> bool {
        self.phases.contains(&VerifyPhase::Skipped)
    }

    pub fn add_step(&mut self, result: StepResult) {
        self.steps.push(result);
    }

    pub fn finalize(&mut self, total_duration: Duration) {
        self.total_duration_ms = total_duration.as_millis() as u64;
        self.enter(VerifyPhase::Done);
    }

    /// Compact summary for logging
    pub fn summary(&self) -> String {
        let passed = self.steps.iter().filter(|s| s.outcome.is_passed()).count();
        let statuses: Vec<String> = self
            .steps
            .iter()
            .map(|s| format!("{}:{}", s.step, s.outcome))
            .collect();

        format!(
            "[{}] {}/{} steps passed ({}ms) [{}]",
            if self.outcome.is_success() {
                "GREEN"
            } else {
                "RED"
            },
            passed,
            self.steps.len(),
            self.total_duration_ms,
            statuses.join(" → "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_outcome_display() {
        assert_eq!(format!("{}", StepOutcome::Passed), "PASS");
        assert_eq!(format!("{}", StepOutcome::Failed), "FAIL");
        assert_eq!(format!("{}", StepOutcome::Skipped), "SKIP");
    }

    #[test]
    fn test_step_result_from_failure_keeps_exit_code() {
        let result = StepResult::from_outcome(
            "test",
            &Outcome::Failure { exit_code: 3 },
            Duration::from_millis(12),
        );
        assert_eq!(result.outcome, StepOutcome::Failed);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.duration_ms, 12);
    }

    #[test]
    fn test_summary_format() {
        let mut report = VerificationReport::new("testinfra", "tests");
        report.add_step(StepResult::from_outcome(
            "lint",
            &Outcome::Success {
                stdout: String::new(),
            },
            Duration::from_millis(5),
        ));
        report.add_step(StepResult::from_outcome(
            "test",
            &Outcome::Failure { exit_code: 1 },
            Duration::from_millis(10),
        ));
        report.outcome = Outcome::Failure { exit_code: 1 };
        report.finalize(Duration::from_millis(15));

        assert_eq!(
            report.summary(),
            "[RED] 1/2 steps passed (15ms) [lint:PASS → test:FAIL]"
        );
        assert_eq!(report.phase(), VerifyPhase::Done);
    }

    #[test]
    fn test_report_serializes_outcome_with_status_tag() {
        let report = VerificationReport::new("testinfra", "tests");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"]["status"], "success");
        assert_eq!(json["phases"][0], "idle");
    }
}
