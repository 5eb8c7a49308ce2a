//! Suite-runner collaborator
//!
//! The orchestrator treats test execution as an opaque capability: discover
//! a suite for a label, run it, get counts back. The shipping
//! [`CommandRunner`] executes a configured command per label and reads the
//! command's final stdout line as a JSON counts object. Collaborator chatter
//! flows through an injected [`OutputSink`] with an explicit verbosity
//! policy instead of being suppressed at the stream level.

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::models::RunCounts;
use crate::resource::DB_DIR_ENV;

/// A discovered, runnable test suite. Serializable because work items cross
/// the worker process boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Suite {
    pub label: String,
    pub argv: Vec<String>,
}

/// How much collaborator output reaches the terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Drop collaborator output entirely.
    Silent,
    /// One progress mark per completed suite.
    #[default]
    Dots,
    /// Forward collaborator output unchanged.
    Full,
}

impl std::fmt::Display for Verbosity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verbosity::Silent => write!(f, "silent"),
            Verbosity::Dots => write!(f, "dots"),
            Verbosity::Full => write!(f, "full"),
        }
    }
}

/// Explicit output policy injected into the worker loop.
#[derive(Clone, Copy, Debug)]
pub struct OutputSink {
    verbosity: Verbosity,
}

impl OutputSink {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    /// Collaborator stream content. Only forwarded at full verbosity.
    pub fn forward(&self, chunk: &str) {
        if self.verbosity == Verbosity::Full && !chunk.is_empty() {
            eprint!("{chunk}");
        }
    }

    /// Called once per completed suite.
    pub fn progress_mark(&self) {
        if self.verbosity == Verbosity::Dots {
            let mut stderr = std::io::stderr().lock();
            let _ = stderr.write_all(b".");
            let _ = stderr.flush();
        }
    }
}

/// External test-execution collaborator.
pub trait SuiteRunner {
    /// Resolve a label into a runnable suite.
    fn discover(&self, label: &str) -> Result<Suite>;

    /// Run a suite against the database state in `db_dir`, returning counts.
    async fn run(&self, suite: &Suite, db_dir: &Path, sink: &OutputSink) -> Result<RunCounts>;
}

/// Command-backed [`SuiteRunner`]. The template's `{label}` placeholders are
/// substituted at discovery; if the template carries none, the label is
/// appended as the final argument.
#[derive(Clone, Debug)]
pub struct CommandRunner {
    template: Vec<String>,
}

impl CommandRunner {
    pub fn new(template: Vec<String>) -> Self {
        Self { template }
    }
}

impl SuiteRunner for CommandRunner {
    fn discover(&self, label: &str) -> Result<Suite> {
        if self.template.is_empty() {
            bail!("no test command configured (set `test_command` in the config file)");
        }

        let mut argv: Vec<String> = self
            .template
            .iter()
            .map(|part| part.replace("{label}", label))
            .collect();
        if !self.template.iter().any(|part| part.contains("{label}")) {
            argv.push(label.to_string());
        }

        Ok(Suite {
            label: label.to_string(),
            argv,
        })
    }

    async fn run(&self, suite: &Suite, db_dir: &Path, sink: &OutputSink) -> Result<RunCounts> {
        debug!("Running suite '{}' via `{}`", suite.label, suite.argv.join(" "));

        let output = Command::new(&suite.argv[0])
            .args(&suite.argv[1..])
            .env(DB_DIR_ENV, db_dir)
            .output()
            .await
            .with_context(|| format!("failed to spawn test command `{}`", suite.argv[0]))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        sink.forward(&stdout);
        sink.forward(&stderr);

        // A failing suite exits nonzero; the counts line is still the
        // authoritative outcome. Only a missing/garbled line is an error.
        let counts = parse_counts_line(&stdout).with_context(|| {
            format!(
                "test command for '{}' produced no counts line (exit {})",
                suite.label, output.status
            )
        })?;

        sink.progress_mark();
        Ok(counts)
    }
}

/// Parse the final non-empty stdout line as a JSON counts object.
fn parse_counts_line(stdout: &str) -> Result<RunCounts> {
    let line = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .context("empty output")?;
    serde_json::from_str(line.trim())
        .with_context(|| format!("final output line is not a counts object: {line}"))
}
