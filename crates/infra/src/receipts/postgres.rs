//! Postgres-backed receipt store.
//!
//! ## Schema
//!
//! `job_receipts` has `job_id` as primary key, so a receipt is written at most once
//! per job even if two watchdog ticks race on the same escalation.
//!
//! ## Statistics
//!
//! Aggregated in SQL: one row of counters, then failures grouped by UTC day
//! (`updated_at` truncated to a multiple of 86400).

use sqlx::{PgPool, Row};
use tracing::instrument;

use async_trait::async_trait;
use switchyard_core::{DailyFailureCount, JobReceipt, JobStatistics, JobStatus};

use super::{ReceiptStore, ReceiptStoreError};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS job_receipts (
    job_id TEXT PRIMARY KEY,
    job_name TEXT NOT NULL,
    job_context JSONB NOT NULL DEFAULT '{}'::jsonb,
    status TEXT NOT NULL,
    updated_at BIGINT NOT NULL,
    retry_count INT NOT NULL DEFAULT 0,
    message TEXT NOT NULL DEFAULT ''
)
"#;

const CREATE_NAME_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS job_receipts_job_name_idx ON job_receipts (job_name)";

/// Postgres receipt store.
#[derive(Debug, Clone)]
pub struct PostgresReceiptStore {
    pool: PgPool,
}

impl PostgresReceiptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the table and index if missing (idempotent).
    pub async fn ensure_schema(&self) -> Result<(), ReceiptStoreError> {
        for statement in [CREATE_TABLE, CREATE_NAME_INDEX] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ReceiptStore for PostgresReceiptStore {
    #[instrument(skip(self, receipt), fields(job_id = %receipt.job_id), err)]
    async fn insert(&self, receipt: &JobReceipt) -> Result<bool, ReceiptStoreError> {
        let retry_count = i32::try_from(receipt.retry_count)
            .map_err(|_| ReceiptStoreError::Serialization("retry_count out of range".into()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO job_receipts
                (job_id, job_name, job_context, status, updated_at, retry_count, message)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (job_id) DO NOTHING
            "#,
        )
        .bind(receipt.job_id.to_string())
        .bind(&receipt.job_name)
        .bind(sqlx::types::Json(&receipt.job_context))
        .bind(receipt.status.as_str())
        .bind(receipt.updated_at)
        .bind(retry_count)
        .bind(&receipt.message)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_receipt", e))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), err)]
    async fn statistics(&self, job_name: &str) -> Result<JobStatistics, ReceiptStoreError> {
        let error = JobStatus::Error.as_str();
        let ok = JobStatus::Ok.as_str();

        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = $2) AS failed,
                COUNT(*) FILTER (WHERE status = $3) AS succeeded,
                COALESCE(SUM(retry_count), 0)::BIGINT AS retry_sum,
                MIN(updated_at) FILTER (WHERE status = $2) AS first_failure_at,
                MAX(updated_at) FILTER (WHERE status = $2) AS last_failure_at
            FROM job_receipts
            WHERE job_name = $1
            "#,
        )
        .bind(job_name)
        .bind(error)
        .bind(ok)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("statistics", e))?;

        let mut stats = JobStatistics::empty(job_name);
        stats.total_receipts = count(row.try_get("total").map_err(row_err)?);
        stats.failed = count(row.try_get("failed").map_err(row_err)?);
        stats.succeeded = count(row.try_get("succeeded").map_err(row_err)?);
        stats.first_failure_at = row.try_get("first_failure_at").map_err(row_err)?;
        stats.last_failure_at = row.try_get("last_failure_at").map_err(row_err)?;
        let retry_sum = count(row.try_get("retry_sum").map_err(row_err)?);
        stats.finish(retry_sum);

        let days = sqlx::query(
            r#"
            SELECT (updated_at / 86400) * 86400 AS day, COUNT(*) AS failures
            FROM job_receipts
            WHERE job_name = $1 AND status = $2
            GROUP BY day
            ORDER BY day ASC
            "#,
        )
        .bind(job_name)
        .bind(error)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("daily_failures", e))?;

        stats.daily_failures = days
            .iter()
            .map(|row| -> Result<DailyFailureCount, sqlx::Error> {
                Ok(DailyFailureCount {
                    day: row.try_get("day")?,
                    failures: count(row.try_get("failures")?),
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(row_err)?;

        Ok(stats)
    }
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn row_err(err: sqlx::Error) -> ReceiptStoreError {
    ReceiptStoreError::Serialization(format!("failed to decode statistics row: {err}"))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> ReceiptStoreError {
    match err {
        sqlx::Error::Database(db_err) => ReceiptStoreError::Database(format!(
            "database error in {operation}: {}",
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            ReceiptStoreError::Database(format!("connection pool closed in {operation}"))
        }
        other => ReceiptStoreError::Database(format!("sqlx error in {operation}: {other}")),
    }
}
