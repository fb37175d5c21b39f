//! Configuration loading errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Config parse error: {0}")]
    Parse(String),
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),
    #[error("Invalid config value: {0}")]
    Invalid(String),
}
