/*!
 * Configuration types for Relay
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use relay_core_resilience::{Backoff, RetryPolicy};

use crate::error::Result;

/// Top-level configuration, usually loaded from `relay.toml`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RelayConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

/// Settings for a command worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Name of the queue the worker drains
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    /// Retries after the first attempt before a command is dead-lettered
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay schedule between attempts
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Keep at most this many dead-letter records (None = unbounded)
    #[serde(default)]
    pub dead_letter_capacity: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_name: default_queue_name(),
            max_retries: default_max_retries(),
            backoff: BackoffConfig::default(),
            dead_letter_capacity: None,
        }
    }
}

impl WorkerConfig {
    /// Build and validate the retry policy described by this config
    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        Ok(RetryPolicy::new(self.max_retries, self.backoff.to_backoff())?)
    }
}

/// Backoff schedule as written in config files
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum BackoffConfig {
    /// Retry immediately
    None,

    /// Same delay before every retry
    Fixed { delay_ms: u64 },

    /// Delay grows by `factor` each retry, capped at `max_ms`
    Exponential {
        initial_ms: u64,
        factor: f64,
        max_ms: u64,
    },
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig::Exponential {
            initial_ms: 100,
            factor: 2.0,
            max_ms: 30_000,
        }
    }
}

impl BackoffConfig {
    pub fn to_backoff(&self) -> Backoff {
        match *self {
            BackoffConfig::None => Backoff::None,
            BackoffConfig::Fixed { delay_ms } => Backoff::Fixed(Duration::from_millis(delay_ms)),
            BackoffConfig::Exponential {
                initial_ms,
                factor,
                max_ms,
            } => Backoff::Exponential {
                initial: Duration::from_millis(initial_ms),
                factor,
                max: Duration::from_millis(max_ms),
            },
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level for diagnostic output
    #[serde(default)]
    pub level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for level = debug)
    #[serde(default)]
    pub verbose: bool,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn default_queue_name() -> String {
    "commands".to_string()
}

fn default_max_retries() -> u32 {
    3
}
