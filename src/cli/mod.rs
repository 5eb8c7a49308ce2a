//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::runner::Verbosity;

/// Parallel test-execution orchestrator
#[derive(Parser, Debug)]
#[command(name = "stampede")]
#[command(version)]
#[command(about = "Fan test groups out across isolated worker processes")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run test groups
    Run(RunArgs),

    /// List configured groups and exclusions
    List(ListArgs),

    /// Internal worker-process entry point
    #[command(hide = true)]
    Worker(WorkerArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Test groups to run; all configured groups minus exclusions if empty
    pub labels: Vec<String>,

    /// Number of parallel worker processes. Negative or absent means use
    /// host parallelism; 0 means run inline in this process (for debugging).
    #[arg(short, long)]
    pub concurrency: Option<i64>,

    /// Reuse the stored database snapshot under this key. Empty means
    /// derive the key from source control.
    #[arg(short = 'm', long, default_value = "")]
    pub ramdb: String,

    /// Snapshot storage root
    #[arg(long)]
    pub cache_dir: Option<String>,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output format (plain, json)
    #[arg(short, long, default_value = "plain")]
    pub format: String,

    /// How much collaborator output reaches the terminal
    #[arg(long, value_enum, default_value_t = Verbosity::Dots)]
    pub verbosity: Verbosity,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Show excluded groups as well
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for the hidden worker subcommand
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Snapshot cache key to load
    #[arg(long)]
    pub cache_key: String,

    /// Snapshot storage root
    #[arg(long)]
    pub cache_dir: String,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// How much collaborator output reaches the terminal
    #[arg(long, value_enum, default_value_t = Verbosity::Dots)]
    pub verbosity: Verbosity,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}
