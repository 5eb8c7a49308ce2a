//! Snapshot capture, caching, and replay
//!
//! A snapshot is one serialized SQL dump per configured logical database,
//! persisted under `<cache_dir>/<cache_key>/<database>.sql`. Existence of
//! every expected file is a cache hit: the expensive migration step is
//! skipped entirely and the dumps are loaded back. The cached snapshot is
//! read-only after creation; each worker replays its own private copy.

mod cachekey;

pub use cachekey::resolve_cache_key;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

use crate::resource::ResourcePrep;

/// One prepared logical database, serialized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatabaseBlob {
    pub database: String,
    pub sql: String,
}

/// A fully prepared resource state, keyed by the cache key it was built
/// under. Owned by the [`SnapshotStore`]; workers only ever clone it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub cache_key: String,
    pub blobs: Vec<DatabaseBlob>,
}

impl Snapshot {
    /// Replay this snapshot into a worker-private directory, one
    /// `<database>.sql` file per blob. The cached original is untouched.
    pub fn restore_into(&self, dir: &Path) -> Result<()> {
        for blob in &self.blobs {
            let path = dir.join(format!("{}.sql", blob.database));
            std::fs::write(&path, &blob.sql)
                .with_context(|| format!("failed to restore snapshot into {}", path.display()))?;
        }
        Ok(())
    }
}

/// Durable storage for snapshots.
#[derive(Clone, Debug)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_dir(&self, cache_key: &str) -> PathBuf {
        self.root.join(cache_key)
    }

    /// Path of the stored dump for one database under one cache key.
    pub fn blob_path(&self, cache_key: &str, database: &str) -> PathBuf {
        self.key_dir(cache_key).join(format!("{database}.sql"))
    }

    /// A key is cached only when every expected database file exists.
    pub fn is_cached(&self, cache_key: &str, databases: &[String]) -> bool {
        !databases.is_empty()
            && databases
                .iter()
                .all(|db| self.blob_path(cache_key, db).exists())
    }

    /// Load a previously stored snapshot without running any setup.
    pub fn load(&self, cache_key: &str, databases: &[String]) -> Result<Snapshot> {
        let mut blobs = Vec::with_capacity(databases.len());
        for database in databases {
            let path = self.blob_path(cache_key, database);
            let sql = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read stored snapshot {}", path.display()))?;
            blobs.push(DatabaseBlob {
                database: database.clone(),
                sql,
            });
        }
        Ok(Snapshot {
            cache_key: cache_key.to_string(),
            blobs,
        })
    }

    /// Return the stored snapshot for `cache_key`, building and persisting
    /// it via the resource-setup collaborator on a miss.
    ///
    /// Storage failures are fatal: there is no degraded uncached mode.
    pub async fn get_or_build<P: ResourcePrep>(
        &self,
        cache_key: &str,
        databases: &[String],
        prep: &mut P,
    ) -> Result<Snapshot> {
        if self.is_cached(cache_key, databases) {
            let files: Vec<String> = databases
                .iter()
                .map(|db| self.blob_path(cache_key, db).display().to_string())
                .collect();
            info!("Reusing database snapshot files:\n{}", files.join("\n"));
            return self.load(cache_key, databases);
        }

        let start = Instant::now();
        info!(
            "No snapshot for key '{}'. Hint: pass --ramdb={} to reuse the stored SQL later.",
            cache_key, cache_key
        );

        prep.prepare().await?;

        let key_dir = self.key_dir(cache_key);
        std::fs::create_dir_all(&key_dir)
            .with_context(|| format!("failed to create snapshot directory {}", key_dir.display()))?;

        let mut blobs = Vec::with_capacity(databases.len());
        for database in databases {
            let sql = prep.dump(database).await?;
            let path = self.blob_path(cache_key, database);
            std::fs::write(&path, &sql)
                .with_context(|| format!("failed to write snapshot file {}", path.display()))?;
            debug!("Stored snapshot blob {}", path.display());
            blobs.push(DatabaseBlob {
                database: database.clone(),
                sql,
            });
        }

        prep.teardown().await?;

        info!(
            "Setup, migrations, snapshot completed in {:.3} seconds",
            start.elapsed().as_secs_f64()
        );

        Ok(Snapshot {
            cache_key: cache_key.to_string(),
            blobs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourcePrep;
    use anyhow::bail;

    /// Counting fake for the expensive setup step.
    struct FakePrep {
        prepares: usize,
        sql: String,
    }

    impl FakePrep {
        fn new(sql: &str) -> Self {
            Self {
                prepares: 0,
                sql: sql.to_string(),
            }
        }
    }

    impl ResourcePrep for FakePrep {
        async fn prepare(&mut self) -> Result<()> {
            self.prepares += 1;
            Ok(())
        }

        async fn dump(&mut self, database: &str) -> Result<String> {
            Ok(format!("-- {database}\n{}", self.sql))
        }

        async fn teardown(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct FailingPrep;

    impl ResourcePrep for FailingPrep {
        async fn prepare(&mut self) -> Result<()> {
            bail!("migrations exploded")
        }

        async fn dump(&mut self, _database: &str) -> Result<String> {
            bail!("unreachable")
        }

        async fn teardown(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn databases() -> Vec<String> {
        vec!["default".to_string(), "reporting".to_string()]
    }

    #[tokio::test]
    async fn second_build_with_same_key_is_a_pure_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let mut prep = FakePrep::new("CREATE TABLE a (id INT);");

        let first = store
            .get_or_build("abc123", &databases(), &mut prep)
            .await
            .unwrap();
        assert_eq!(prep.prepares, 1);
        assert_eq!(first.blobs.len(), 2);

        let second = store
            .get_or_build("abc123", &databases(), &mut prep)
            .await
            .unwrap();
        // Setup ran exactly once across both calls
        assert_eq!(prep.prepares, 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn distinct_keys_get_independent_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        let mut prep_a = FakePrep::new("INSERT INTO a VALUES (1);");
        let mut prep_b = FakePrep::new("INSERT INTO b VALUES (2);");

        store
            .get_or_build("key-a", &databases(), &mut prep_a)
            .await
            .unwrap();
        store
            .get_or_build("key-b", &databases(), &mut prep_b)
            .await
            .unwrap();

        let a = std::fs::read_to_string(store.blob_path("key-a", "default")).unwrap();
        let b = std::fs::read_to_string(store.blob_path("key-b", "default")).unwrap();
        assert!(a.contains("INSERT INTO a"));
        assert!(b.contains("INSERT INTO b"));
    }

    #[tokio::test]
    async fn partial_cache_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let mut prep = FakePrep::new("SELECT 1;");

        store
            .get_or_build("k", &databases(), &mut prep)
            .await
            .unwrap();
        std::fs::remove_file(store.blob_path("k", "reporting")).unwrap();
        assert!(!store.is_cached("k", &databases()));

        store
            .get_or_build("k", &databases(), &mut prep)
            .await
            .unwrap();
        assert_eq!(prep.prepares, 2);
    }

    #[tokio::test]
    async fn setup_failure_is_fatal_and_leaves_no_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        let err = store
            .get_or_build("k", &databases(), &mut FailingPrep)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("migrations exploded"));
        assert!(!store.is_cached("k", &databases()));
    }

    #[test]
    fn restore_writes_private_copies() {
        let snapshot = Snapshot {
            cache_key: "k".to_string(),
            blobs: vec![DatabaseBlob {
                database: "default".to_string(),
                sql: "CREATE TABLE t (id INT);".to_string(),
            }],
        };

        let worker_dir = tempfile::tempdir().unwrap();
        snapshot.restore_into(worker_dir.path()).unwrap();

        let restored =
            std::fs::read_to_string(worker_dir.path().join("default.sql")).unwrap();
        assert_eq!(restored, "CREATE TABLE t (id INT);");
    }
}
