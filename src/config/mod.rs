//! Configuration module for the point engine
//!
//! This module holds the engine's own runtime settings: scheduler pool sizes,
//! the input-resolution poll interval and logging options. Point definitions
//! are supplied by the embedding application and are not read from here.
//!
//! # Config Location
//!
//! `EngineConfig::load_or_default` looks for `pointflow.toml` in the
//! platform-appropriate config directory:
//!
//! - **Linux**: `~/.config/pointflow/`
//! - **macOS**: `~/Library/Application Support/pointflow/`
//! - **Windows**: `%APPDATA%\pointflow\`
//!
//! # Example
//!
//! ```toml
//! [scheduler]
//! worker_threads = 4
//! max_blocking_threads = 64
//!
//! [resolution]
//! poll_interval_ms = 500
//!
//! [logging]
//! filter = "info,pointflow=debug"
//! log_dir = "/var/log/pointflow"
//! ```

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "pointflow";

/// Config filename
pub const CONFIG_FILE: &str = "pointflow.toml";

/// Default number of async worker threads driving timers
pub const DEFAULT_WORKER_THREADS: usize = 2;

/// Default upper bound on threads running pipeline callbacks
pub const DEFAULT_MAX_BLOCKING_THREADS: usize = 32;

/// Default interval between attempts to resolve missing input points
pub const DEFAULT_RESOLUTION_POLL_MS: u64 = 500;

/// Default tracing filter directive
pub const DEFAULT_LOG_FILTER: &str = "info,pointflow=debug";

/// Get the platform config directory for the engine
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default config file
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub resolution: ResolutionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Sizing of the shared scheduler's thread pools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Async worker threads that wait on timers
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Maximum threads executing pipeline callbacks at once
    #[serde(default = "default_max_blocking_threads")]
    pub max_blocking_threads: usize,
}

fn default_worker_threads() -> usize {
    DEFAULT_WORKER_THREADS
}

fn default_max_blocking_threads() -> usize {
    DEFAULT_MAX_BLOCKING_THREADS
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            max_blocking_threads: DEFAULT_MAX_BLOCKING_THREADS,
        }
    }
}

/// Settings for derived-value input resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Milliseconds between attempts to find missing input points
    #[serde(default = "default_resolution_poll_ms")]
    pub poll_interval_ms: u64,
}

fn default_resolution_poll_ms() -> u64 {
    DEFAULT_RESOLUTION_POLL_MS
}

impl ResolutionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_RESOLUTION_POLL_MS,
        }
    }
}

/// Logging output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Directory for daily rolling log files (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            log_dir: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            EngineError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, falling back to defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = default_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load engine config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.worker_threads == 0 {
            return Err(EngineError::Config(
                "scheduler.worker_threads must be at least 1".into(),
            ));
        }
        if self.scheduler.max_blocking_threads == 0 {
            return Err(EngineError::Config(
                "scheduler.max_blocking_threads must be at least 1".into(),
            ));
        }
        if self.resolution.poll_interval_ms == 0 {
            return Err(EngineError::Config(
                "resolution.poll_interval_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
