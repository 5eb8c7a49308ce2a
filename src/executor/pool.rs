//! Worker process pool
//!
//! Each worker is an isolated OS process: a re-exec of the current binary's
//! hidden `worker` subcommand. The collaborator behind the worker holds
//! process-global state (open connections, registered fixtures), so process
//! isolation is the correctness mechanism here, not a performance choice.
//!
//! A per-child feeder task bridges the in-memory queues to the child's
//! pipes: it pops one work item at a time, writes it to the child's stdin as
//! a JSON line, and reads one JSON summary line back from its stdout. A
//! child that dies mid-item simply never delivers that label to the result
//! queue; the orchestrator reports it as lost work.

use anyhow::{Context, Result};
use futures::future::join_all;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::executor::worker::{ResultItem, WorkItem};
use crate::models::ResultSummary;
use crate::queue::JobQueue;
use crate::runner::Verbosity;

/// Everything a child process needs to reconstruct its execution context.
#[derive(Clone, Debug)]
pub struct WorkerSpec {
    pub exe: PathBuf,
    pub cache_key: String,
    pub cache_dir: PathBuf,
    pub config_path: Option<PathBuf>,
    pub verbosity: Verbosity,
    pub colorize: bool,
}

impl WorkerSpec {
    fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "worker".to_string(),
            "--cache-key".to_string(),
            self.cache_key.clone(),
            "--cache-dir".to_string(),
            self.cache_dir.display().to_string(),
            "--verbosity".to_string(),
            match self.verbosity {
                Verbosity::Silent => "silent".to_string(),
                Verbosity::Dots => "dots".to_string(),
                Verbosity::Full => "full".to_string(),
            },
        ];
        if let Some(path) = &self.config_path {
            args.push("--config".to_string());
            args.push(path.display().to_string());
        }
        if !self.colorize {
            args.push("--no-color".to_string());
        }
        args
    }
}

/// Spawn `worker_count` child processes and run them to completion. Worker
/// failures are tolerated here; they surface later as lost labels.
pub async fn dispatch(
    work: Arc<JobQueue<WorkItem>>,
    results: Arc<JobQueue<ResultItem>>,
    worker_count: usize,
    spec: WorkerSpec,
) -> Result<()> {
    debug!("Spawning {} worker processes", worker_count);

    let mut handles = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let work = work.clone();
        let results = results.clone();
        let spec = spec.clone();
        handles.push(tokio::spawn(async move {
            feed_worker(worker_id, work, results, spec).await
        }));
    }

    for outcome in join_all(handles).await {
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("worker channel failed: {e:#}"),
            Err(e) => warn!("worker task panicked: {e}"),
        }
    }
    Ok(())
}

async fn feed_worker(
    worker_id: usize,
    work: Arc<JobQueue<WorkItem>>,
    results: Arc<JobQueue<ResultItem>>,
    spec: WorkerSpec,
) -> Result<()> {
    let mut child = Command::new(&spec.exe)
        .args(spec.to_args())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn worker process {worker_id}"))?;

    let mut stdin = child
        .stdin
        .take()
        .context("worker stdin unavailable")?;
    let stdout = child
        .stdout
        .take()
        .context("worker stdout unavailable")?;
    let mut lines = BufReader::new(stdout).lines();

    while let Some(item) = work.pop_nonblocking() {
        let label = item.label.clone();
        let mut frame =
            serde_json::to_string(&item).context("failed to encode work item frame")?;
        frame.push('\n');

        if stdin.write_all(frame.as_bytes()).await.is_err() {
            warn!("worker {worker_id} closed its pipe; '{label}' will be reported as lost");
            break;
        }

        match lines.next_line().await {
            Ok(Some(line)) => match serde_json::from_str::<ResultSummary>(&line) {
                Ok(summary) => {
                    if let Err(e) = results.push((label.clone(), summary)) {
                        warn!("result queue rejected '{label}': {e}");
                    }
                }
                Err(e) => {
                    warn!("worker {worker_id} returned an unreadable result for '{label}': {e}");
                    break;
                }
            },
            Ok(None) | Err(_) => {
                warn!("worker {worker_id} exited before returning a result for '{label}'");
                break;
            }
        }
    }

    // EOF on stdin is the termination signal for the child
    drop(stdin);
    let status = child
        .wait()
        .await
        .with_context(|| format!("failed to join worker process {worker_id}"))?;
    if !status.success() {
        warn!("worker {worker_id} exited with {status}");
    }
    Ok(())
}
