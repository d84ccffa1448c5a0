//! Job record and status.

use core::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::JobId;

/// Opaque key/value payload handed to workers unmodified (insertion order preserved).
pub type JobContext = serde_json::Map<String, serde_json::Value>;

/// Current Unix time in whole seconds.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Lifecycle state of a job.
///
/// `Pending` until a worker reports back or the watchdog gives up; `Ok` and
/// `Error` are terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Ok,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Ok => "ok",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Ok | JobStatus::Error)
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "ok" => Ok(JobStatus::Ok),
            "error" => Ok(JobStatus::Error),
            other => Err(DomainError::invalid_value(format!("job status: {other:?}"))),
        }
    }
}

/// Transient job state, one record per job id in the key-value store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    /// Logical job type, used for worker routing and statistics grouping.
    pub name: String,
    pub context: JobContext,
    pub status: JobStatus,
    pub created_at: i64,
    pub updated_at: i64,
    /// Incremented once per watchdog redelivery, never decremented.
    pub retry_count: u32,
    /// Last human-readable status string; empty until the first outcome.
    pub message: String,
}

impl JobRecord {
    /// A freshly enqueued job.
    pub fn pending(id: JobId, name: impl Into<String>, context: JobContext, now: i64) -> Self {
        Self {
            id,
            name: name.into(),
            context,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            retry_count: 0,
            message: String::new(),
        }
    }

    /// Apply a terminal outcome. Applying the same outcome twice yields the same record;
    /// `updated_at` only moves when status or message change.
    pub fn resolve(&mut self, status: JobStatus, message: impl Into<String>, now: i64) {
        let message = message.into();
        if self.status == status && self.message == message {
            return;
        }
        self.status = status;
        self.message = message;
        self.updated_at = now;
    }

    /// Record one watchdog redelivery.
    pub fn record_retry(&mut self, now: i64) {
        self.retry_count += 1;
        self.updated_at = now;
    }
}
