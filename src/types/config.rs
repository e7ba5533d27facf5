//! Configuration structures.
//!
//! Configuration is fixed at bus construction. It can be built in code with
//! the `with_*` setters or loaded from a JSON document.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::errors::{Error, Result};

/// Global bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Message processing options.
    #[serde(default)]
    pub processing: ProcessingOptions,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Parse configuration from a JSON string. Missing sections use defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.processing.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

/// Options governing asynchronous delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingOptions {
    /// Maximum number of pipelines in flight at once.
    pub max_concurrent_messages: usize,

    /// Queue length at which `send` starts applying backpressure.
    pub max_queue_size: usize,

    /// Retries after the first failed attempt (total attempts = max_retries + 1).
    pub max_retries: u32,

    /// Delay between attempts.
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Swallow handler failures and retry them. When false the first failure
    /// is reported and the envelope dropped.
    pub swallow_errors: bool,

    /// Upper bound on a single backpressure wait before the queue length is
    /// checked again.
    #[serde(with = "humantime_serde")]
    pub admission_poll_interval: Duration,

    /// How long shutdown waits for the dispatch loop to exit.
    #[serde(with = "humantime_serde")]
    pub shutdown_grace_period: Duration,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            max_concurrent_messages: cpus * 2,
            max_queue_size: 1000,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            swallow_errors: true,
            admission_poll_interval: Duration::from_millis(10),
            shutdown_grace_period: Duration::from_secs(5),
        }
    }
}

impl ProcessingOptions {
    pub fn with_max_concurrent_messages(mut self, n: usize) -> Self {
        self.max_concurrent_messages = n;
        self
    }

    pub fn with_max_queue_size(mut self, n: usize) -> Self {
        self.max_queue_size = n;
        self
    }

    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_swallow_errors(mut self, swallow: bool) -> Self {
        self.swallow_errors = swallow;
        self
    }

    pub fn with_admission_poll_interval(mut self, interval: Duration) -> Self {
        self.admission_poll_interval = interval;
        self
    }

    pub fn with_shutdown_grace_period(mut self, grace: Duration) -> Self {
        self.shutdown_grace_period = grace;
        self
    }

    /// Reject options the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_messages == 0 {
            return Err(Error::validation("max_concurrent_messages must be at least 1"));
        }
        if self.max_queue_size == 0 {
            return Err(Error::validation("max_queue_size must be at least 1"));
        }
        if self.admission_poll_interval.is_zero() {
            return Err(Error::validation("admission_poll_interval must be non-zero"));
        }
        Ok(())
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
