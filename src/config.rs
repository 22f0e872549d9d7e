//! Engine configuration
//!
//! Resolution order:
//! 1. Built-in defaults
//! 2. Optional YAML file (`FOCUS_CONFIG` or an explicit path)
//! 3. `FOCUS_*` environment variable overrides

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::CacheCategory;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid value '{value}' for environment variable {var}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub bridge: BridgeConfig,
    pub cache: CacheConfig,
    pub query: QueryConfig,
    /// How long shutdown waits for in-flight scripts
    pub shutdown_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig::default(),
            cache: CacheConfig::default(),
            query: QueryConfig::default(),
            shutdown_grace_ms: 5_000,
        }
    }
}

/// Execution bridge settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Scripting host executable
    pub program: String,
    /// Arguments making the host read a JavaScript program from stdin
    pub args: Vec<String>,
    pub timeout_ms: u64,
    /// Additional attempts after the first for retryable failures
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Consecutive failures before the circuit opens
    pub circuit_threshold: u32,
    pub circuit_cooldown_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: "osascript".to_string(),
            args: vec!["-l".into(), "JavaScript".into(), "-".into()],
            timeout_ms: 60_000,
            max_retries: 2,
            backoff_base_ms: 250,
            backoff_max_ms: 4_000,
            circuit_threshold: 3,
            circuit_cooldown_ms: 30_000,
        }
    }
}

impl BridgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn circuit_cooldown(&self) -> Duration {
        Duration::from_millis(self.circuit_cooldown_ms)
    }
}

/// Per-category cache lifetimes, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub tasks_ttl_secs: u64,
    pub projects_ttl_secs: u64,
    pub tags_ttl_secs: u64,
    pub analytics_ttl_secs: u64,
    pub reviews_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            tasks_ttl_secs: 30,
            projects_ttl_secs: 300,
            tags_ttl_secs: 600,
            analytics_ttl_secs: 3_600,
            reviews_ttl_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self, category: CacheCategory) -> Duration {
        let secs = match category {
            CacheCategory::Tasks => self.tasks_ttl_secs,
            CacheCategory::Projects => self.projects_ttl_secs,
            CacheCategory::Tags => self.tags_ttl_secs,
            CacheCategory::Analytics => self.analytics_ttl_secs,
            CacheCategory::Reviews => self.reviews_ttl_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Limits applied while compiling and generating queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    /// Candidates the primary pass may hand to the secondary context
    pub candidate_cap: usize,
    pub max_batch: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: 25,
            max_limit: 500,
            candidate_cap: 2_000,
            max_batch: 100,
        }
    }
}

impl EngineConfig {
    /// Load configuration using the standard resolution order.
    ///
    /// An explicit `path` wins over `FOCUS_CONFIG`; with neither, only
    /// defaults and environment overrides apply.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("FOCUS_CONFIG").ok().map(PathBuf::from));

        let mut config = match file {
            Some(path) => Self::from_yaml_file(&path)?,
            None => {
                debug!("No config file given, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loaded engine config");
        Ok(config)
    }

    /// Apply `FOCUS_*` overrides. The lookup is injected so tests do not
    /// have to touch the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(program) = lookup("FOCUS_OSASCRIPT") {
            self.bridge.program = program;
        }
        if let Some(v) = parse_env(&lookup, "FOCUS_SCRIPT_TIMEOUT_MS")? {
            self.bridge.timeout_ms = v;
        }
        if let Some(v) = parse_env(&lookup, "FOCUS_MAX_RETRIES")? {
            self.bridge.max_retries = v;
        }
        if let Some(v) = parse_env(&lookup, "FOCUS_CIRCUIT_THRESHOLD")? {
            self.bridge.circuit_threshold = v;
        }
        if let Some(v) = parse_env(&lookup, "FOCUS_CIRCUIT_COOLDOWN_MS")? {
            self.bridge.circuit_cooldown_ms = v;
        }
        Ok(())
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn parse_env<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
    }
}
