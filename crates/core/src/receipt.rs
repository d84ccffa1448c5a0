//! Permanent job receipts and the statistics aggregated over them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::JobId;
use crate::job::{JobContext, JobRecord, JobStatus};

/// Status message written when the watchdog gives up on a job.
pub const MAX_RETRIES_MESSAGE: &str = "marked as failed after max retries";

const SECONDS_PER_DAY: i64 = 86_400;

/// Durable record of a job's terminal outcome (append-only, one per job).
///
/// Only escalated failures produce receipts; successful completions live solely in
/// the transient job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReceipt {
    pub job_id: JobId,
    pub job_name: String,
    pub job_context: JobContext,
    pub status: JobStatus,
    pub updated_at: i64,
    pub retry_count: u32,
    pub message: String,
}

impl JobReceipt {
    /// Receipt for a job escalated to permanent failure.
    pub fn escalated(record: &JobRecord, now: i64) -> Self {
        Self {
            job_id: record.id,
            job_name: record.name.clone(),
            job_context: record.context.clone(),
            status: JobStatus::Error,
            updated_at: now,
            retry_count: record.retry_count,
            message: MAX_RETRIES_MESSAGE.to_string(),
        }
    }
}

/// Failures bucketed by UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyFailureCount {
    /// Unix timestamp of 00:00 UTC on that day.
    pub day: i64,
    pub failures: u64,
}

/// Aggregate view over all receipts for one job name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatistics {
    pub job_name: String,
    pub total_receipts: u64,
    pub failed: u64,
    pub succeeded: u64,
    /// `failed / total_receipts`, `0.0` when there are no receipts.
    pub failure_rate: f64,
    pub average_retry_count: f64,
    pub first_failure_at: Option<i64>,
    pub last_failure_at: Option<i64>,
    pub daily_failures: Vec<DailyFailureCount>,
}

impl JobStatistics {
    pub fn empty(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            total_receipts: 0,
            failed: 0,
            succeeded: 0,
            failure_rate: 0.0,
            average_retry_count: 0.0,
            first_failure_at: None,
            last_failure_at: None,
            daily_failures: Vec::new(),
        }
    }

    /// Aggregate receipts in memory. Receipts for other job names are ignored.
    pub fn from_receipts<'a>(
        job_name: &str,
        receipts: impl IntoIterator<Item = &'a JobReceipt>,
    ) -> Self {
        let mut stats = Self::empty(job_name);
        let mut retry_sum: u64 = 0;
        let mut days: BTreeMap<i64, u64> = BTreeMap::new();

        for receipt in receipts.into_iter().filter(|r| r.job_name == job_name) {
            stats.total_receipts += 1;
            retry_sum += u64::from(receipt.retry_count);

            match receipt.status {
                JobStatus::Error => {
                    stats.failed += 1;
                    stats.first_failure_at = Some(
                        stats
                            .first_failure_at
                            .map_or(receipt.updated_at, |t| t.min(receipt.updated_at)),
                    );
                    stats.last_failure_at = Some(
                        stats
                            .last_failure_at
                            .map_or(receipt.updated_at, |t| t.max(receipt.updated_at)),
                    );
                    *days.entry(day_start(receipt.updated_at)).or_default() += 1;
                }
                JobStatus::Ok => stats.succeeded += 1,
                JobStatus::Pending => {}
            }
        }

        stats.finish(retry_sum);
        stats.daily_failures = days
            .into_iter()
            .map(|(day, failures)| DailyFailureCount { day, failures })
            .collect();
        stats
    }

    /// Fill in the derived ratios once the counters are known.
    pub fn finish(&mut self, retry_sum: u64) {
        if self.total_receipts > 0 {
            self.failure_rate = self.failed as f64 / self.total_receipts as f64;
            self.average_retry_count = retry_sum as f64 / self.total_receipts as f64;
        }
    }
}

/// Start of the UTC day containing `ts`.
pub fn day_start(ts: i64) -> i64 {
    ts.div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY
}
