//! Resource-setup collaborator
//!
//! The orchestrator never talks to a database engine directly. It asks a
//! [`ResourcePrep`] implementation to run the (expensive) migration step once
//! and hand back one serialized SQL dump per configured logical database;
//! the snapshot layer persists and replays those dumps.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

/// Environment variable pointing collaborator commands at the directory
/// holding (or receiving) the per-database `.sql` files.
pub const DB_DIR_ENV: &str = "STAMPEDE_DB_DIR";

/// External collaborator that prepares a fully migrated database state.
///
/// Lifecycle: `prepare` once, `dump` once per database, `teardown` once.
pub trait ResourcePrep {
    /// Run the expensive setup step (migrations) from scratch.
    async fn prepare(&mut self) -> Result<()>;

    /// Serialize one prepared logical database as a SQL blob.
    async fn dump(&mut self, database: &str) -> Result<String>;

    /// Release whatever `prepare` allocated.
    async fn teardown(&mut self) -> Result<()>;
}

/// Command-backed [`ResourcePrep`]: runs a configured migration command in a
/// private scratch directory and expects it to leave one `<database>.sql`
/// file there per logical database.
pub struct CommandPrep {
    argv: Vec<String>,
    scratch: Option<TempDir>,
}

impl CommandPrep {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            scratch: None,
        }
    }

    fn scratch_path(&self, database: &str) -> Result<PathBuf> {
        let scratch = self
            .scratch
            .as_ref()
            .context("dump called before prepare")?;
        Ok(scratch.path().join(format!("{database}.sql")))
    }
}

impl ResourcePrep for CommandPrep {
    async fn prepare(&mut self) -> Result<()> {
        if self.argv.is_empty() {
            bail!("no migration command configured (set `migrate_command` in the config file)");
        }

        let scratch = tempfile::Builder::new()
            .prefix("stampede-migrate-")
            .tempdir()
            .context("failed to create migration scratch directory")?;

        info!("Running (often slow) migrations via `{}`", self.argv.join(" "));
        let output = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .env(DB_DIR_ENV, scratch.path())
            .output()
            .await
            .with_context(|| format!("failed to spawn migration command `{}`", self.argv[0]))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "migration command exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }

        self.scratch = Some(scratch);
        Ok(())
    }

    async fn dump(&mut self, database: &str) -> Result<String> {
        let path = self.scratch_path(database)?;
        debug!("Dumping database '{}' from {}", database, path.display());
        std::fs::read_to_string(&path).with_context(|| {
            format!(
                "migration command produced no dump for database '{}' at {}",
                database,
                path.display()
            )
        })
    }

    async fn teardown(&mut self) -> Result<()> {
        if let Some(scratch) = self.scratch.take() {
            scratch
                .close()
                .context("failed to remove migration scratch directory")?;
        }
        Ok(())
    }
}
