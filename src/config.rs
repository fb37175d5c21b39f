//! Configuration file loading.
//!
//! A config file has three optional sections:
//!
//! ```toml
//! [planner]
//! week_start = "Mon"
//! date_format = "%Y/%m/%d"
//!
//! [sandbox]
//! default_timeout = 10000
//! max_source_bytes = 1048576
//! max_loop_iterations = 5000000
//!
//! [logging]
//! filter = "seedforge=debug"
//! ```
//!
//! YAML and JSON files with the same shape are accepted too.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::planner::PlannerOptions;
use crate::sandbox::RunnerConfig;

/// Supported config file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.yaml` / `.yml`
    Yaml,
    /// `.json`
    Json,
    /// `.toml`
    Toml,
}

impl ConfigFormat {
    /// Pick the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "json" => Ok(ConfigFormat::Json),
            "toml" => Ok(ConfigFormat::Toml),
            other => Err(ConfigError::UnsupportedFormat(if other.is_empty() {
                path.display().to_string()
            } else {
                other.to_string()
            })),
        }
    }
}

/// Sandbox section: runner limits plus engine limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    #[serde(flatten)]
    pub runner: RunnerConfig,
    /// Abort scripts after this many loop iterations
    pub max_loop_iterations: Option<u64>,
    /// Abort scripts that recurse deeper than this
    pub max_recursion_depth: Option<usize>,
}

impl SandboxSection {
    #[cfg(feature = "builtin-sandbox-js")]
    pub fn js_engine_config(&self) -> seedforge_sandbox_js::JsEngineConfig {
        seedforge_sandbox_js::JsEngineConfig {
            max_loop_iterations: self.max_loop_iterations,
            max_recursion_depth: self.max_recursion_depth,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` overrides it.
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Top-level configuration. Every field has a default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedforgeConfig {
    pub planner: PlannerOptions,
    pub sandbox: SandboxSection,
    pub logging: LoggingSection,
}

/// Parse config text in the given format.
pub fn parse_config(content: &str, format: ConfigFormat) -> Result<SeedforgeConfig, ConfigError> {
    let config: SeedforgeConfig = match format {
        ConfigFormat::Yaml => {
            serde_saphyr::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?
        }
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?
        }
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?
        }
    };
    validate(&config)?;
    Ok(config)
}

/// Read and parse a config file, format chosen by extension.
pub fn load_config(path: &Path) -> Result<SeedforgeConfig, ConfigError> {
    let format = ConfigFormat::from_path(path)?;
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content, format)
}

fn validate(config: &SeedforgeConfig) -> Result<(), ConfigError> {
    if config.planner.date_format.is_empty() {
        return Err(ConfigError::Invalid("planner.date_format is empty".into()));
    }
    config
        .planner
        .validate()
        .map_err(|e| ConfigError::Invalid(format!("planner.date_format: {e}")))?;
    if config.sandbox.runner.max_source_bytes == 0 {
        return Err(ConfigError::Invalid("sandbox.max_source_bytes must be positive".into()));
    }
    if config.logging.filter.trim().is_empty() {
        return Err(ConfigError::Invalid("logging.filter is empty".into()));
    }
    Ok(())
}
