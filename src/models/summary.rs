//! Result summary models
//!
//! Defines per-group and merged run summaries plus severity classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Label used for the merged run-level summary.
pub const OVERALL_LABEL: &str = "OVERALL";

/// Raw counts returned by the test-execution collaborator for one group.
///
/// This is the wire shape the configured test command must emit as its
/// final stdout line (a single JSON object).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunCounts {
    #[serde(default)]
    pub ran: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub errored: u64,
    #[serde(default)]
    pub skipped: u64,
    #[serde(default)]
    pub expected_failed: u64,
    #[serde(default)]
    pub unexpected_passed: u64,
    /// `module.class.method` reproduction strings for failed/errored
    /// tests. Opaque to the orchestrator, echoed in the final recap.
    #[serde(default)]
    pub failing_tests: Vec<String>,
}

/// Severity tier of a summary, driving banner color and exit code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Attention,
    Critical,
}

impl Severity {
    /// ANSI color escape for this tier.
    pub fn color(&self) -> &'static str {
        match self {
            Severity::Ok => "\x1b[32m",
            Severity::Attention => "\x1b[33m",
            Severity::Critical => "\x1b[31m",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Ok => write!(f, "ok"),
            Severity::Attention => write!(f, "attention"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Outcome of one test group, or of the whole run under `OVERALL`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub group_id: String,
    pub ran: u64,
    pub failed: u64,
    pub errored: u64,
    pub skipped: u64,
    pub expected_failed: u64,
    pub unexpected_passed: u64,
    pub elapsed_seconds: f64,
    #[serde(default)]
    pub failing_tests: Vec<String>,
}

impl ResultSummary {
    /// Build a summary from collaborator counts and measured elapsed time.
    pub fn from_counts(group_id: impl Into<String>, counts: RunCounts, elapsed_seconds: f64) -> Self {
        Self {
            group_id: group_id.into(),
            ran: counts.ran,
            failed: counts.failed,
            errored: counts.errored,
            skipped: counts.skipped,
            expected_failed: counts.expected_failed,
            unexpected_passed: counts.unexpected_passed,
            elapsed_seconds,
            failing_tests: counts.failing_tests,
        }
    }

    /// Summary for a group whose collaborator invocation itself broke.
    /// The breakage is contained here as a single errored count.
    pub fn broken(group_id: impl Into<String>, elapsed_seconds: f64) -> Self {
        let group_id = group_id.into();
        Self {
            failing_tests: vec![group_id.clone()],
            group_id,
            ran: 0,
            failed: 0,
            errored: 1,
            skipped: 0,
            expected_failed: 0,
            unexpected_passed: 0,
            elapsed_seconds,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.errored > 0
    }

    pub fn severity(&self) -> Severity {
        if self.failed > 0 || self.errored > 0 {
            Severity::Critical
        } else if self.skipped > 0 || self.expected_failed > 0 || self.unexpected_passed > 0 {
            Severity::Attention
        } else {
            Severity::Ok
        }
    }

    /// Comma-joined non-zero counts, trailing comma included when any are
    /// present so it slots between `run=` and `took=` in the group line.
    pub fn short_summary(&self) -> String {
        let mut parts = Vec::new();
        if self.failed > 0 {
            parts.push(format!("failures={}", self.failed));
        }
        if self.errored > 0 {
            parts.push(format!("errors={}", self.errored));
        }
        if self.skipped > 0 {
            parts.push(format!("skipped={}", self.skipped));
        }
        if self.expected_failed > 0 {
            parts.push(format!("expected failures={}", self.expected_failed));
        }
        if self.unexpected_passed > 0 {
            parts.push(format!("unexpected successes={}", self.unexpected_passed));
        }
        if parts.is_empty() {
            String::new()
        } else {
            parts.push(String::new());
            parts.join(", ")
        }
    }

    /// The one-line human-readable form printed per completed group.
    pub fn line(&self) -> String {
        format!(
            "{} (run={}, {}took={:.3}s)",
            self.group_id,
            self.ran,
            self.short_summary(),
            self.elapsed_seconds
        )
    }
}

impl fmt::Display for ResultSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.line())
    }
}

/// Element-wise sum of completed group summaries under `OVERALL`.
///
/// `elapsed_seconds` is the wall-clock span of the whole run, not a sum,
/// and is supplied by the caller. Addition is commutative and associative,
/// so completion order never changes the result.
pub fn merge(summaries: &[ResultSummary], wall_clock_seconds: f64) -> ResultSummary {
    let mut merged = ResultSummary {
        group_id: OVERALL_LABEL.to_string(),
        ran: 0,
        failed: 0,
        errored: 0,
        skipped: 0,
        expected_failed: 0,
        unexpected_passed: 0,
        elapsed_seconds: wall_clock_seconds,
        failing_tests: Vec::new(),
    };
    for summary in summaries {
        merged.ran += summary.ran;
        merged.failed += summary.failed;
        merged.errored += summary.errored;
        merged.skipped += summary.skipped;
        merged.expected_failed += summary.expected_failed;
        merged.unexpected_passed += summary.unexpected_passed;
        merged
            .failing_tests
            .extend(summary.failing_tests.iter().cloned());
    }
    merged
}
