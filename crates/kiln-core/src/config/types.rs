//! Configuration types

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults::{
    default_cache_dir, default_staging_root, expand_home, DEFAULT_POLL_INTERVAL_MS,
};

/// Main configuration for Kiln
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local task cache
    pub cache: CacheConfig,

    /// Remote agent execution
    pub agent: AgentConfig,

    /// Staging store used for file-based input/output exchange
    pub staging: StagingConfig,
}

/// Local task cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether cacheable tasks consult the cache
    pub enabled: bool,

    /// Cache directory (default: ~/.kiln/local-cache)
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl CacheConfig {
    /// Cache directory with defaults and `~` applied
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(default_cache_dir)
    }
}

/// Remote agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Delay between status polls, in milliseconds
    pub poll_interval_ms: u64,

    /// Show a spinner while a remote task runs
    pub show_progress: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            show_progress: true,
        }
    }
}

impl AgentConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Staging store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Root of the shared staging area (default: ~/.kiln/staging)
    pub root: Option<PathBuf>,

    /// Scratch directory for local copies (default: system temp dir)
    pub local_scratch: Option<PathBuf>,
}

impl StagingConfig {
    pub fn resolved_root(&self) -> PathBuf {
        self.root
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(default_staging_root)
    }

    pub fn resolved_scratch(&self) -> PathBuf {
        self.local_scratch
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(|| std::env::temp_dir().join("kiln"))
    }
}
