//! stampede - parallel test-execution orchestrator
//!
//! Fans independent test groups out across a bounded pool of isolated
//! worker processes. Each worker replays a cached snapshot of the fully
//! migrated database state into its own private copy, runs one group's
//! suite, and reports counts back; the orchestrator merges everything into
//! a single run-level summary and flags any group whose result never
//! arrived.
//!
//! ## Usage
//!
//! ```bash
//! # Run all configured groups with host parallelism
//! stampede run
//!
//! # Run two groups across 4 worker processes
//! stampede run acme coyote --concurrency 4
//!
//! # Reuse the snapshot stored under an explicit key
//! stampede run --ramdb v1.2.3
//!
//! # Debug a flaky group inline, no worker processes
//! stampede run acme --concurrency 0
//!
//! # Show configured groups
//! stampede list --detailed
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod cli;
mod config;
mod executor;
mod models;
mod output;
mod queue;
mod resource;
mod runner;
mod snapshot;

use cli::Args;
use config::{ConfigFile, EnvConfig};
use executor::{run_worker_process, Orchestrator, RunOptions};
use output::{OutputFormat, ReportRenderer};
use resource::CommandPrep;
use runner::{CommandRunner, OutputSink, Verbosity};
use snapshot::SnapshotStore;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr: a worker process's stdout is the result protocol.
    FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match args.command {
        cli::Command::Run(run_args) => {
            let code = run_command(run_args).await?;
            std::process::exit(code);
        }
        cli::Command::List(list_args) => {
            list_groups(list_args)?;
        }
        cli::Command::Worker(worker_args) => {
            worker_command(worker_args).await?;
        }
    }

    Ok(())
}

async fn run_command(args: cli::RunArgs) -> Result<i32> {
    let env = EnvConfig::load();
    let config_path = args
        .config
        .clone()
        .or_else(|| env.config_file.clone().map(PathBuf::from));
    let config = load_config(config_path.as_deref())?;

    let labels = config.effective_labels(&args.labels);
    if labels.is_empty() {
        bail!("no test groups to run: pass labels or configure `groups` in the config file");
    }

    let concurrency = resolve_concurrency(args.concurrency.or(env.concurrency));
    let cache_dir = args
        .cache_dir
        .or(env.cache_dir)
        .unwrap_or_else(|| config.cache_dir.clone());
    let cache_key = if args.ramdb.is_empty() {
        env.ramdb.filter(|key| !key.is_empty())
    } else {
        Some(args.ramdb)
    };

    let mut verbosity = args.verbosity;
    if verbosity == Verbosity::Dots {
        if let Some(from_env) = env
            .verbosity
            .as_deref()
            .and_then(|v| <Verbosity as clap::ValueEnum>::from_str(v, true).ok())
        {
            verbosity = from_env;
        }
    }
    // With no explicit labels the run covers everything; keep the terminal
    // focused on failures unless the user asked for more.
    if args.labels.is_empty() && verbosity == Verbosity::Dots {
        verbosity = Verbosity::Silent;
    }
    let no_color = args.no_color || env.no_color.unwrap_or(false);

    let runner = CommandRunner::new(config.test_command.clone());
    let mut prep = CommandPrep::new(config.migrate_command.clone());
    let orchestrator = Orchestrator::new(SnapshotStore::new(&cache_dir), config.databases.clone());

    let report = orchestrator
        .run(
            &runner,
            &mut prep,
            RunOptions {
                labels,
                extra: None,
                concurrency,
                cache_key,
                verbosity,
                colorize: !no_color,
                config_path,
            },
        )
        .await?;

    let format = OutputFormat::from_str(&args.format)
        .with_context(|| format!("unknown output format: {}", args.format))?;
    let mut renderer = ReportRenderer::new(format);
    if no_color {
        renderer = renderer.no_color();
    }
    println!("{}", renderer.render(&report));

    Ok(if report.is_clean() { 0 } else { 1 })
}

fn list_groups(args: cli::ListArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    if config.groups.is_empty() {
        println!("No groups configured.");
        return Ok(());
    }

    println!("Configured test groups:");
    for group in &config.groups {
        let excluded = config.exclude.contains(group);
        if excluded && !args.detailed {
            continue;
        }
        if excluded {
            println!("  {group} (excluded)");
        } else {
            println!("  {group}");
        }
    }
    Ok(())
}

async fn worker_command(args: cli::WorkerArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let store = SnapshotStore::new(&args.cache_dir);
    let snapshot = store
        .load(&args.cache_key, &config.databases)
        .context("worker could not load the cached snapshot")?;
    let runner = CommandRunner::new(config.test_command.clone());
    let sink = OutputSink::new(args.verbosity);
    run_worker_process(&snapshot, &runner, &sink, !args.no_color).await
}

fn load_config(path: Option<&std::path::Path>) -> Result<ConfigFile> {
    match path {
        Some(path) => ConfigFile::load(path),
        None => ConfigFile::load_default(),
    }
}

/// Negative or absent means host parallelism; 0 is the inline debug mode.
fn resolve_concurrency(requested: Option<i64>) -> usize {
    match requested {
        Some(n) if n >= 0 => n as usize,
        _ => std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_concurrency_is_respected() {
        assert_eq!(resolve_concurrency(Some(0)), 0);
        assert_eq!(resolve_concurrency(Some(6)), 6);
    }

    #[test]
    fn negative_or_absent_concurrency_uses_host_parallelism() {
        assert!(resolve_concurrency(None) >= 1);
        assert!(resolve_concurrency(Some(-1)) >= 1);
    }
}
