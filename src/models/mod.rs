//! Data models for the test orchestrator
//!
//! This module contains the summary and severity types shared across the
//! queueing, worker, and reporting layers.

mod summary;

pub use summary::{merge, ResultSummary, RunCounts, Severity};
