//! Configuration file management
//!
//! Finds, loads, and validates the YAML/JSON configuration describing the
//! known test groups, the exclusion set, the logical databases, and the
//! collaborator command templates. Group enumeration is explicit
//! configuration here, never ambient global state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./stampede.yaml",
    "./stampede.yml",
    "./.stampede.yaml",
    "./.stampede/config.yaml",
    "~/.config/stampede/config.yaml",
];

/// Full configuration file structure
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Version of config file format
    #[serde(default = "default_version")]
    pub version: String,

    /// All known test groups
    #[serde(default)]
    pub groups: Vec<String>,

    /// Groups excluded when no labels are passed on the command line
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Logical databases the snapshot must capture
    #[serde(default = "default_databases")]
    pub databases: Vec<String>,

    /// Snapshot storage root
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Per-group test command template; `{label}` is substituted
    #[serde(default)]
    pub test_command: Vec<String>,

    /// Migration command run once on a snapshot-cache miss
    #[serde(default)]
    pub migrate_command: Vec<String>,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_databases() -> Vec<String> {
    vec!["default".to_string()]
}

fn default_cache_dir() -> String {
    "local_cache".to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            version: default_version(),
            groups: Vec::new(),
            exclude: Vec::new(),
            databases: default_databases(),
            cache_dir: default_cache_dir(),
            test_command: Vec::new(),
            migrate_command: Vec::new(),
        }
    }
}

impl ConfigFile {
    /// Find configuration file in standard locations
    pub fn find() -> Option<PathBuf> {
        for location in CONFIG_LOCATIONS {
            let path = expand_path(location);
            if path.exists() {
                return Some(path);
            }
        }
        None
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        if let Some(path) = Self::find() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.version != "1.0" {
            anyhow::bail!("Unsupported config version: {}", self.version);
        }
        if self.databases.is_empty() {
            anyhow::bail!("At least one logical database must be configured");
        }
        for excluded in &self.exclude {
            if !self.groups.contains(excluded) {
                anyhow::bail!("Excluded group '{}' is not a known group", excluded);
            }
        }
        Ok(())
    }

    /// Labels to run: the CLI's labels verbatim, or the configured groups
    /// minus the exclusion set when none were passed.
    pub fn effective_labels(&self, cli_labels: &[String]) -> Vec<String> {
        if !cli_labels.is_empty() {
            return cli_labels.to_vec();
        }
        self.groups
            .iter()
            .filter(|group| !self.exclude.contains(group))
            .cloned()
            .collect()
    }
}

fn is_yaml_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn expand_path(location: &str) -> PathBuf {
    if let Some(rest) = location.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn load_yaml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "stampede.yaml",
            r#"
groups: [acme, coyote, famishius]
exclude: [famishius]
databases: [default, reporting]
test_command: ["pytest", "tests/{label}"]
migrate_command: ["./migrate.sh"]
"#,
        );

        let config = ConfigFile::load(&path).unwrap();
        assert_eq!(config.groups.len(), 3);
        assert_eq!(config.databases, vec!["default", "reporting"]);
        assert_eq!(
            config.effective_labels(&[]),
            vec!["acme".to_string(), "coyote".to_string()]
        );
    }

    #[test]
    fn load_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "stampede.json",
            r#"{"groups": ["acme"], "test_command": ["run-tests"]}"#,
        );

        let config = ConfigFile::load(&path).unwrap();
        assert_eq!(config.groups, vec!["acme"]);
        // Defaults fill the gaps
        assert_eq!(config.databases, vec!["default"]);
        assert_eq!(config.cache_dir, "local_cache");
    }

    #[test]
    fn cli_labels_override_configured_groups() {
        let config = ConfigFile {
            groups: vec!["acme".to_string(), "coyote".to_string()],
            ..ConfigFile::default()
        };
        let labels = config.effective_labels(&["meep".to_string()]);
        assert_eq!(labels, vec!["meep".to_string()]);
    }

    #[test]
    fn unknown_excluded_group_fails_validation() {
        let config = ConfigFile {
            groups: vec!["acme".to_string()],
            exclude: vec!["ghost".to_string()],
            ..ConfigFile::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unsupported_version_fails_validation() {
        let config = ConfigFile {
            version: "2.0".to_string(),
            ..ConfigFile::default()
        };
        assert!(config.validate().is_err());
    }
}
