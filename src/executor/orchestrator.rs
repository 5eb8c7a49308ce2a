//! Run lifecycle
//!
//! The orchestrator owns a single run end to end:
//! `INIT → SNAPSHOT_READY → DISPATCHED → COLLECTING → MERGED → REPORTED`.
//! It resolves the cache key, obtains the snapshot, seeds the work queue
//! with every group before any worker may treat the queue as drained, spawns
//! the pool (or runs inline), joins, drains results, reconciles submitted
//! against completed labels, and merges. There is no retry of lost or
//! failed groups.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::executor::pool::{self, WorkerSpec};
use crate::executor::worker::{self, ResultItem, WorkItem};
use crate::models::{merge, ResultSummary, Severity};
use crate::queue::JobQueue;
use crate::resource::ResourcePrep;
use crate::runner::{OutputSink, Suite, SuiteRunner, Verbosity};
use crate::snapshot::{resolve_cache_key, SnapshotStore};

/// Label under which caller-supplied out-of-band tests are dispatched.
pub const EXTRA_LABEL: &str = "extra_tests";

/// Lifecycle states of one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Init,
    SnapshotReady,
    Dispatched,
    Collecting,
    Merged,
    Reported,
}

fn transition(from: RunState, to: RunState) -> RunState {
    debug!("run state {from:?} -> {to:?}");
    to
}

/// Per-run options resolved by the CLI layer.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub labels: Vec<String>,
    /// Optional synthetic out-of-band suite, dispatched under
    /// [`EXTRA_LABEL`].
    pub extra: Option<Suite>,
    /// Worker process count; 0 runs the whole loop inline for debugging.
    pub concurrency: usize,
    /// Explicit snapshot key (`--ramdb`); `None` probes source control.
    pub cache_key: Option<String>,
    pub verbosity: Verbosity,
    pub colorize: bool,
    /// Config file forwarded to worker processes.
    pub config_path: Option<PathBuf>,
}

/// Everything the run produced, ready for rendering.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub concurrency: usize,
    pub merged: ResultSummary,
    pub completed: Vec<ResultSummary>,
    /// Labels submitted to the work queue that never produced a result.
    pub lost: Vec<String>,
    /// Groups with failures or errors.
    pub failing_groups: Vec<String>,
    /// Groups with skips but no failures.
    pub skipped_groups: Vec<String>,
}

impl RunReport {
    pub fn severity(&self) -> Severity {
        self.merged.severity()
    }

    /// Clean means every submitted group completed with zero failures and
    /// zero errors. Lost groups are not clean.
    pub fn is_clean(&self) -> bool {
        self.lost.is_empty() && !self.merged.has_failures()
    }
}

/// Split drained results into summaries and the lost label set
/// (`submitted − completed`), preserving nothing silently.
pub fn reconcile(
    submitted: &[String],
    completed: Vec<ResultItem>,
) -> (Vec<ResultSummary>, Vec<String>) {
    let retrieved: HashSet<&str> = completed
        .iter()
        .map(|(label, _)| label.as_str())
        .collect();
    let mut lost: Vec<String> = submitted
        .iter()
        .filter(|label| !retrieved.contains(label.as_str()))
        .cloned()
        .collect();
    lost.sort();
    let summaries = completed.into_iter().map(|(_, summary)| summary).collect();
    (summaries, lost)
}

/// Owns the worker pool and the two queues for the duration of one run.
pub struct Orchestrator {
    store: SnapshotStore,
    databases: Vec<String>,
}

impl Orchestrator {
    pub fn new(store: SnapshotStore, databases: Vec<String>) -> Self {
        Self { store, databases }
    }

    pub async fn run<R: SuiteRunner, P: ResourcePrep>(
        &self,
        runner: &R,
        prep: &mut P,
        opts: RunOptions,
    ) -> Result<RunReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        let state = RunState::Init;

        // INIT -> SNAPSHOT_READY
        let cache_key = match opts.cache_key.as_deref() {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => resolve_cache_key().await,
        };
        let snapshot = self
            .store
            .get_or_build(&cache_key, &self.databases, prep)
            .await?;
        let state = transition(state, RunState::SnapshotReady);

        // Seed the work queue completely before any worker starts, so an
        // empty queue is an unambiguous termination signal.
        let total = opts.labels.len() + usize::from(opts.extra.is_some());
        let work = Arc::new(JobQueue::new(total));
        let results = Arc::new(JobQueue::new(total));
        let mut submitted = Vec::with_capacity(total);
        for label in &opts.labels {
            let suite = runner.discover(label)?;
            work.push(WorkItem {
                label: label.clone(),
                suite,
            })
            .context("work queue seeding overflowed")?;
            submitted.push(label.clone());
        }
        if let Some(suite) = opts.extra.clone() {
            work.push(WorkItem {
                label: EXTRA_LABEL.to_string(),
                suite,
            })
            .context("work queue seeding overflowed")?;
            submitted.push(EXTRA_LABEL.to_string());
        }

        // SNAPSHOT_READY -> DISPATCHED
        let worker_count = opts.concurrency.min(total);
        let sink = OutputSink::new(opts.verbosity);
        let state = transition(state, RunState::Dispatched);
        if worker_count == 0 {
            info!("Running {} groups inline (concurrency 0)", total);
            worker::run_worker_loop(&work, &results, &snapshot, runner, &sink, opts.colorize)
                .await?;
        } else {
            info!("Dispatching {} groups across {} worker processes", total, worker_count);
            let spec = WorkerSpec {
                exe: std::env::current_exe().context("cannot locate own executable")?,
                cache_key: cache_key.clone(),
                cache_dir: self.store.root().to_path_buf(),
                config_path: opts.config_path.clone(),
                verbosity: opts.verbosity,
                colorize: opts.colorize,
            };
            pool::dispatch(work.clone(), results.clone(), worker_count, spec).await?;
        }

        // DISPATCHED -> COLLECTING: all workers have been joined above.
        let state = transition(state, RunState::Collecting);
        if !work.is_empty() {
            warn!("{} work items were never picked up by a worker", work.len());
        }
        let (summaries, lost) = reconcile(&submitted, results.drain_all());
        if !lost.is_empty() {
            warn!(
                "groups lost under --concurrency={}: {}",
                opts.concurrency,
                lost.join(" ")
            );
        }

        // COLLECTING -> MERGED
        let state = transition(state, RunState::Merged);
        let merged = merge(&summaries, start.elapsed().as_secs_f64());
        let mut failing_groups: Vec<String> = summaries
            .iter()
            .filter(|s| s.has_failures())
            .map(|s| s.group_id.clone())
            .collect();
        failing_groups.sort();
        let mut skipped_groups: Vec<String> = summaries
            .iter()
            .filter(|s| s.skipped > 0 && !s.has_failures())
            .map(|s| s.group_id.clone())
            .collect();
        skipped_groups.sort();

        let report = RunReport {
            started_at,
            concurrency: opts.concurrency,
            merged,
            completed: summaries,
            lost,
            failing_groups,
            skipped_groups,
        };

        // MERGED -> REPORTED: terminal; the caller renders the report.
        let _ = transition(state, RunState::Reported);
        Ok(report)
    }
}
