//! Report rendering
//!
//! Turns a [`RunReport`] into the final terminal output: the lost-work
//! diagnostic, a copy-paste recap of skipped and failing groups, repro
//! strings for individual failing tests, and the severity-colored banner
//! carrying the OVERALL line.

use crate::executor::RunReport;
use crate::models::Severity;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Plain,
    Json,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "plain" => Some(OutputFormat::Plain),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

/// Report renderer
pub struct ReportRenderer {
    format: OutputFormat,
    colorize: bool,
}

impl ReportRenderer {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    fn paint(&self, text: &str, color: &str) -> String {
        if self.colorize {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    pub fn render(&self, report: &RunReport) -> String {
        match self.format {
            OutputFormat::Plain => self.render_plain(report),
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
        }
    }

    fn render_plain(&self, report: &RunReport) -> String {
        let mut out = String::new();

        if !report.lost.is_empty() {
            out.push_str(&format!(
                "Groups that did not return results under --concurrency={} \
                 (try running separately, or with --concurrency=0): {}\n",
                report.concurrency,
                report.lost.join(" ")
            ));
        }

        if !report.skipped_groups.is_empty() || !report.failing_groups.is_empty() {
            out.push_str(&format!(
                "---Copy/Paste-to-re-run---{}-or-{}{}\n",
                self.paint("Skipped", YELLOW),
                self.paint("FAILING", RED),
                "-".repeat(28)
            ));
            if !report.skipped_groups.is_empty() {
                out.push_str(&self.paint(&report.skipped_groups.join(" "), YELLOW));
                out.push('\n');
            }
            if !report.failing_groups.is_empty() {
                out.push_str(&self.paint(&report.failing_groups.join(" "), RED));
                out.push('\n');
            }
        }

        for repro in &report.merged.failing_tests {
            out.push_str(&self.paint(repro, RED));
            out.push('\n');
        }

        out.push_str(&self.banner(report));
        out
    }

    fn banner(&self, report: &RunReport) -> String {
        let banner = format!(
            "_  \\~ -stampede{}\n `=/  {}\n~` `~ {}",
            "-".repeat(64),
            report.merged.line(),
            "-".repeat(74)
        );
        if self.colorize {
            format!("{BOLD}{}{banner}{RESET}", self.severity_color(report.severity()))
        } else {
            banner
        }
    }

    fn severity_color(&self, severity: Severity) -> &'static str {
        severity.color()
    }
}

impl Default for ReportRenderer {
    fn default() -> Self {
        Self::new(OutputFormat::Plain)
    }
}
