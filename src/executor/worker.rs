//! Worker loop
//!
//! A worker repeatedly pulls one work item, replays the cached snapshot into
//! a fresh private directory (the isolation boundary that makes parallelism
//! safe), runs the suite through the collaborator, and pushes a summary onto
//! the result queue. Failures inside a group are converted to counts here
//! and never cross the queue as errors.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::models::{ResultSummary, RunCounts};
use crate::queue::JobQueue;
use crate::runner::{OutputSink, Suite, SuiteRunner};
use crate::snapshot::Snapshot;

/// One unit of dispatched work: a label plus the suite payload the
/// collaborator needs to execute it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub label: String,
    pub suite: Suite,
}

/// `(label, summary)` pairs carried by the result queue.
pub type ResultItem = (String, ResultSummary);

/// Drain the work queue. An empty queue is the termination condition, not a
/// retry signal; the orchestrator finishes all pushes before workers start.
pub async fn run_worker_loop<R: SuiteRunner>(
    work: &JobQueue<WorkItem>,
    results: &JobQueue<ResultItem>,
    snapshot: &Snapshot,
    runner: &R,
    sink: &OutputSink,
    colorize: bool,
) -> Result<()> {
    while let Some(item) = work.pop_nonblocking() {
        let summary = run_one(&item, snapshot, runner, sink).await;
        announce(&summary, colorize);
        results
            .push((item.label, summary))
            .map_err(|e| anyhow!("result queue rejected a summary: {e}"))?;
    }
    Ok(())
}

/// Execute one work item against a private snapshot clone. Any breakage of
/// the collaborator invocation itself is contained as an errored count.
pub async fn run_one<R: SuiteRunner>(
    item: &WorkItem,
    snapshot: &Snapshot,
    runner: &R,
    sink: &OutputSink,
) -> ResultSummary {
    let start = Instant::now();
    match clone_and_run(item, snapshot, runner, sink).await {
        Ok(counts) => {
            ResultSummary::from_counts(&item.label, counts, start.elapsed().as_secs_f64())
        }
        Err(e) => {
            warn!("suite '{}' could not be executed: {e:#}", item.label);
            ResultSummary::broken(&item.label, start.elapsed().as_secs_f64())
        }
    }
}

async fn clone_and_run<R: SuiteRunner>(
    item: &WorkItem,
    snapshot: &Snapshot,
    runner: &R,
    sink: &OutputSink,
) -> Result<RunCounts> {
    let db_dir = tempfile::Builder::new()
        .prefix("stampede-worker-")
        .tempdir()
        .context("failed to create worker-private database directory")?;
    snapshot.restore_into(db_dir.path())?;
    debug!(
        "Cloned snapshot '{}' into {} for '{}'",
        snapshot.cache_key,
        db_dir.path().display(),
        item.label
    );
    runner.run(&item.suite, db_dir.path(), sink).await
}

/// Emit the per-group progress line as a single write so lines from
/// concurrent workers never interleave.
pub fn announce(summary: &ResultSummary, colorize: bool) {
    let line = summary.line();
    let msg = if colorize {
        format!("{}{}\x1b[0m\n", summary.severity().color(), line)
    } else {
        format!("{line}\n")
    };
    let mut stderr = std::io::stderr().lock();
    let _ = stderr.write_all(msg.as_bytes());
}

/// Child-process entry behind the hidden `worker` subcommand: work items
/// arrive as JSON lines on stdin, summaries leave as JSON lines on stdout.
/// EOF on stdin means the parent has no more work.
pub async fn run_worker_process<R: SuiteRunner>(
    snapshot: &Snapshot,
    runner: &R,
    sink: &OutputSink,
    colorize: bool,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines
        .next_line()
        .await
        .context("failed to read work item from stdin")?
    {
        if line.trim().is_empty() {
            continue;
        }
        let item: WorkItem =
            serde_json::from_str(&line).context("unreadable work item frame")?;
        let summary = run_one(&item, snapshot, runner, sink).await;
        announce(&summary, colorize);

        let mut frame =
            serde_json::to_string(&summary).context("failed to encode result frame")?;
        frame.push('\n');
        stdout
            .write_all(frame.as_bytes())
            .await
            .context("failed to write result frame")?;
        stdout.flush().await.context("failed to flush result frame")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::Verbosity;
    use crate::snapshot::DatabaseBlob;
    use anyhow::bail;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;

    fn snapshot() -> Snapshot {
        Snapshot {
            cache_key: "test".to_string(),
            blobs: vec![DatabaseBlob {
                database: "default".to_string(),
                sql: "CREATE TABLE t (id INT);".to_string(),
            }],
        }
    }

    /// Scripted collaborator: fixed counts per label, records the database
    /// directories it was handed.
    struct ScriptedRunner {
        counts: HashMap<String, RunCounts>,
        seen_dirs: Mutex<Vec<std::path::PathBuf>>,
    }

    impl ScriptedRunner {
        fn new(counts: HashMap<String, RunCounts>) -> Self {
            Self {
                counts,
                seen_dirs: Mutex::new(Vec::new()),
            }
        }
    }

    impl SuiteRunner for ScriptedRunner {
        fn discover(&self, label: &str) -> Result<Suite> {
            Ok(Suite {
                label: label.to_string(),
                argv: vec![label.to_string()],
            })
        }

        async fn run(
            &self,
            suite: &Suite,
            db_dir: &Path,
            _sink: &OutputSink,
        ) -> Result<RunCounts> {
            // The private clone must actually be there
            assert!(db_dir.join("default.sql").exists());
            self.seen_dirs.lock().unwrap().push(db_dir.to_path_buf());
            match self.counts.get(&suite.label) {
                Some(counts) => Ok(counts.clone()),
                None => bail!("unknown label"),
            }
        }
    }

    fn item(label: &str) -> WorkItem {
        WorkItem {
            label: label.to_string(),
            suite: Suite {
                label: label.to_string(),
                argv: vec![label.to_string()],
            },
        }
    }

    #[tokio::test]
    async fn loop_drains_queue_and_pushes_every_result() {
        let counts: HashMap<String, RunCounts> = [
            ("alpha", RunCounts { ran: 3, failed: 1, ..RunCounts::default() }),
            ("beta", RunCounts { ran: 2, skipped: 1, ..RunCounts::default() }),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let runner = ScriptedRunner::new(counts);

        let work = JobQueue::new(2);
        work.push(item("alpha")).unwrap();
        work.push(item("beta")).unwrap();
        let results = JobQueue::new(2);
        let sink = OutputSink::new(Verbosity::Silent);

        run_worker_loop(&work, &results, &snapshot(), &runner, &sink, false)
            .await
            .unwrap();

        assert!(work.is_empty());
        let mut done = results.drain_all();
        done.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(done.len(), 2);
        assert_eq!(done[0].0, "alpha");
        assert_eq!(done[0].1.failed, 1);
        assert_eq!(done[1].1.skipped, 1);
    }

    #[tokio::test]
    async fn each_item_gets_its_own_private_clone() {
        let counts: HashMap<String, RunCounts> = [
            ("a", RunCounts::default()),
            ("b", RunCounts::default()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let runner = ScriptedRunner::new(counts);

        let work = JobQueue::new(2);
        work.push(item("a")).unwrap();
        work.push(item("b")).unwrap();
        let results = JobQueue::new(2);
        let sink = OutputSink::new(Verbosity::Silent);

        run_worker_loop(&work, &results, &snapshot(), &runner, &sink, false)
            .await
            .unwrap();

        let dirs = runner.seen_dirs.lock().unwrap();
        assert_eq!(dirs.len(), 2);
        assert_ne!(dirs[0], dirs[1]);
    }

    #[tokio::test]
    async fn broken_collaborator_is_contained_as_an_errored_count() {
        let runner = ScriptedRunner::new(HashMap::new());
        let sink = OutputSink::new(Verbosity::Silent);

        let summary = run_one(&item("ghost"), &snapshot(), &runner, &sink).await;
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.ran, 0);
        assert_eq!(summary.group_id, "ghost");
    }

    #[test]
    fn work_items_roundtrip_through_json_frames() {
        let original = item("acme");
        let frame = serde_json::to_string(&original).unwrap();
        let back: WorkItem = serde_json::from_str(&frame).unwrap();
        assert_eq!(original, back);
    }
}
