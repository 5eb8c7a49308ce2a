//! Configuration management
//!
//! File-based configuration (groups, databases, command templates) with
//! environment variable overrides.

mod env;
mod file;

pub use env::EnvConfig;
pub use file::ConfigFile;
