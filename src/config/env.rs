//! Environment variable configuration
//!
//! Provides `STAMPEDE_*` overrides for the flags most often set per-machine
//! rather than per-invocation.

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "STAMPEDE";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Worker count from STAMPEDE_CONCURRENCY
    pub concurrency: Option<i64>,
    /// Snapshot cache key from STAMPEDE_RAMDB
    pub ramdb: Option<String>,
    /// Snapshot storage root from STAMPEDE_CACHE_DIR
    pub cache_dir: Option<String>,
    /// Config file from STAMPEDE_CONFIG
    pub config_file: Option<String>,
    /// Verbosity from STAMPEDE_VERBOSITY
    pub verbosity: Option<String>,
    /// Color suppression from STAMPEDE_NO_COLOR
    pub no_color: Option<bool>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            concurrency: get_env_parse("CONCURRENCY"),
            ramdb: get_env("RAMDB"),
            cache_dir: get_env("CACHE_DIR"),
            config_file: get_env("CONFIG"),
            verbosity: get_env("VERBOSITY"),
            no_color: get_env_bool("NO_COLOR"),
        }
    }

}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_environment_has_nothing() {
        let config = EnvConfig::default();
        assert!(config.concurrency.is_none());
        assert!(config.ramdb.is_none());
        assert!(config.no_color.is_none());
    }

    #[test]
    fn bool_parsing_accepts_common_truthy_values() {
        for value in ["1", "true", "YES", "on"] {
            env::set_var("STAMPEDE_NO_COLOR", value);
            assert_eq!(get_env_bool("NO_COLOR"), Some(true), "value {value}");
        }
        env::set_var("STAMPEDE_NO_COLOR", "0");
        assert_eq!(get_env_bool("NO_COLOR"), Some(false));
        env::remove_var("STAMPEDE_NO_COLOR");
        assert_eq!(get_env_bool("NO_COLOR"), None);
    }
}
