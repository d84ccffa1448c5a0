//! Wire messages exchanged with workers over the broker.

use serde::{Deserialize, Serialize};

use crate::job::{JobContext, JobStatus};

/// Work message published on the `jobs` queue (initial enqueue and every retry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_name: String,
    pub job_context: JobContext,
    pub job_id: String,
}

/// Outcome reported by a worker.
///
/// Encoded as an integer on the wire: `0 = OK`, `1 = ERROR`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FinishStatus {
    Ok,
    Error,
}

impl TryFrom<u8> for FinishStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            0 => Ok(FinishStatus::Ok),
            1 => Ok(FinishStatus::Error),
            other => Err(format!("unknown finish status code {other}")),
        }
    }
}

impl From<FinishStatus> for u8 {
    fn from(value: FinishStatus) -> Self {
        match value {
            FinishStatus::Ok => 0,
            FinishStatus::Error => 1,
        }
    }
}

impl From<FinishStatus> for JobStatus {
    fn from(value: FinishStatus) -> Self {
        match value {
            FinishStatus::Ok => JobStatus::Ok,
            FinishStatus::Error => JobStatus::Error,
        }
    }
}

/// Completion message consumed from the `jobs-finished` queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishJobMessage {
    pub job_id: String,
    #[serde(default)]
    pub message: String,
    pub status: FinishStatus,
}
