//! Scheduler configuration.
//!
//! Layered with the `config` crate: built-in defaults, then an optional file named by
//! `SCHEDULER_CONFIG`, then environment variables. Variable names are the upper-case
//! field names (`PORT`, `CACHE_URL`, `WORKER_MAX_JOB_RETRIES`, ...).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchyard_observability::LogFormat;

/// Environment variable naming an optional config file.
pub const CONFIG_PATH_ENV: &str = "SCHEDULER_CONFIG";

/// Scheduler service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Postgres URL for receipts and the worker registry.
    pub database_url: String,
    /// Redis URL of the message broker.
    pub message_bus_url: String,
    /// Redis URL of the job store.
    pub cache_url: String,
    /// Prefetch limit of the completion consumer.
    pub worker_unacked_message_count: usize,
    /// Seconds after the last enqueue/retry before a pending job counts as stuck.
    pub worker_stuck_job_threshold_secs: u64,
    /// Retries before a stuck job is escalated to permanent failure.
    pub worker_max_job_retries: u32,
    /// Seconds between watchdog scans.
    pub watchdog_interval_secs: u64,
    /// Re-score a job in the pending index after a retry, so it is not retried again
    /// before another full threshold has passed.
    pub rescore_on_retry: bool,
    /// Back-off before the completion consumer re-reads unacknowledged deliveries.
    pub consumer_retry_delay_ms: u64,
    /// Consumer name within the `scheduler` group. Must be stable across restarts so
    /// the consumer finds its own unacknowledged deliveries again.
    pub consumer_name: String,
    pub log_format: LogFormat,
    /// `false` wires in-memory adapters (dev/test).
    pub use_persistent_stores: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "postgres://localhost:5432/scheduler".to_string(),
            message_bus_url: "redis://localhost:6379".to_string(),
            cache_url: "redis://localhost:6379".to_string(),
            worker_unacked_message_count: 10,
            worker_stuck_job_threshold_secs: 300,
            worker_max_job_retries: 3,
            watchdog_interval_secs: 60,
            rescore_on_retry: true,
            consumer_retry_delay_ms: 1_000,
            consumer_name: "scheduler-1".to_string(),
            log_format: LogFormat::Json,
            use_persistent_stores: false,
        }
    }
}

impl SchedulerConfig {
    /// Load from defaults, `$SCHEDULER_CONFIG` (if set) and the process environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).ok();
        Self::load_from(path.as_deref(), config::Environment::default())
    }

    /// Load with an explicit file path and environment source.
    pub fn load_from(
        path: Option<&str>,
        environment: config::Environment,
    ) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&SchedulerConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(environment.try_parsing(true));

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.worker_unacked_message_count == 0 {
            return Err(invalid("worker_unacked_message_count must be at least 1"));
        }
        if self.worker_stuck_job_threshold_secs == 0 {
            return Err(invalid("worker_stuck_job_threshold_secs must be at least 1"));
        }
        if self.watchdog_interval_secs == 0 {
            return Err(invalid("watchdog_interval_secs must be at least 1"));
        }
        if self.consumer_name.trim().is_empty() {
            return Err(invalid("consumer_name must not be empty"));
        }
        Ok(())
    }

    pub fn stuck_job_threshold(&self) -> Duration {
        Duration::from_secs(self.worker_stuck_job_threshold_secs)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs)
    }

    pub fn consumer_retry_delay(&self) -> Duration {
        Duration::from_millis(self.consumer_retry_delay_ms)
    }
}

fn invalid(msg: &str) -> config::ConfigError {
    config::ConfigError::Message(msg.to_string())
}
