//! Test execution engine
//!
//! Worker loop, worker process pool, and the orchestrator that drives a run
//! from snapshot to report.

mod orchestrator;
mod pool;
mod worker;

pub use orchestrator::{reconcile, Orchestrator, RunOptions, RunReport};
pub use worker::run_worker_process;
