//! Cache-key derivation from source control
//!
//! Best effort: `git describe`, then the mercurial equivalent, then a fixed
//! default sentinel. Probe failure is never fatal; the run just loses
//! snapshot history under the shared default key.

use tokio::process::Command;
use tracing::warn;

/// Sentinel key used when no source-control tag can be derived. Snapshots
/// stored under it are overwritten on each run without history.
pub const DEFAULT_CACHE_KEY: &str = "default";

/// Derive a short stable cache key for the current code state.
pub async fn resolve_cache_key() -> String {
    if let Some(key) = probe("git", &["describe", "--always"]).await {
        return sanitize(&key);
    }
    if let Some(key) = probe(
        "hg",
        &[
            "log",
            "-r",
            ".",
            "--template",
            "{latesttag}-{latesttagdistance}-{node|short}",
        ],
    )
    .await
    {
        return sanitize(&key);
    }

    warn!(
        "git or hg source control not found, only most recent snapshot kept under '{}'",
        DEFAULT_CACHE_KEY
    );
    DEFAULT_CACHE_KEY.to_string()
}

async fn probe(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    let key = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// The key becomes a directory name; anything path-hostile is flattened.
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
