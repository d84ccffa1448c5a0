//! Postgres-backed worker service registry.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use super::{RegistryError, WorkerServiceRegistry};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS worker_services (
    service_id TEXT PRIMARY KEY,
    job_name TEXT NOT NULL
)
"#;

#[derive(Debug, Clone)]
pub struct PostgresWorkerServiceRegistry {
    pool: PgPool,
}

impl PostgresWorkerServiceRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the table if missing (idempotent).
    pub async fn ensure_schema(&self) -> Result<(), RegistryError> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl WorkerServiceRegistry for PostgresWorkerServiceRegistry {
    #[instrument(skip(self), err)]
    async fn register(&self, service_id: &str, job_name: &str) -> Result<(), RegistryError> {
        sqlx::query(
            r#"
            INSERT INTO worker_services (service_id, job_name)
            VALUES ($1, $2)
            ON CONFLICT (service_id) DO UPDATE SET job_name = EXCLUDED.job_name
            "#,
        )
        .bind(service_id)
        .bind(job_name)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("register", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn unregister(&self, service_id: &str) -> Result<bool, RegistryError> {
        let result = sqlx::query("DELETE FROM worker_services WHERE service_id = $1")
            .bind(service_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("unregister", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn services_for(&self, job_name: &str) -> Result<Vec<String>, RegistryError> {
        let rows = sqlx::query(
            "SELECT service_id FROM worker_services WHERE job_name = $1 ORDER BY service_id ASC",
        )
        .bind(job_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("services_for", e))?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("service_id"))
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("services_for", e))
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RegistryError {
    match err {
        sqlx::Error::Database(db_err) => {
            RegistryError::Database(format!("database error in {operation}: {}", db_err.message()))
        }
        other => RegistryError::Database(format!("sqlx error in {operation}: {other}")),
    }
}
