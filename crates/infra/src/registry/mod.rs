//! Registry of worker services and the job names they handle.

pub mod postgres;

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

pub use postgres::PostgresWorkerServiceRegistry;

/// Registry error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("database error: {0}")]
    Database(String),
}

/// Maps worker service ids to the job name they consume.
#[async_trait]
pub trait WorkerServiceRegistry: Send + Sync {
    /// Insert or replace the mapping for `service_id`.
    async fn register(&self, service_id: &str, job_name: &str) -> Result<(), RegistryError>;

    /// Remove a service. Returns `false` if it was not registered.
    async fn unregister(&self, service_id: &str) -> Result<bool, RegistryError>;

    /// Service ids registered for `job_name`, sorted.
    async fn services_for(&self, job_name: &str) -> Result<Vec<String>, RegistryError>;
}

/// In-memory registry for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryWorkerServiceRegistry {
    services: RwLock<BTreeMap<String, String>>,
}

impl InMemoryWorkerServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkerServiceRegistry for InMemoryWorkerServiceRegistry {
    async fn register(&self, service_id: &str, job_name: &str) -> Result<(), RegistryError> {
        self.services
            .write()
            .unwrap()
            .insert(service_id.to_string(), job_name.to_string());
        Ok(())
    }

    async fn unregister(&self, service_id: &str) -> Result<bool, RegistryError> {
        Ok(self.services.write().unwrap().remove(service_id).is_some())
    }

    async fn services_for(&self, job_name: &str) -> Result<Vec<String>, RegistryError> {
        Ok(self
            .services
            .read()
            .unwrap()
            .iter()
            .filter(|(_, name)| *name == job_name)
            .map(|(id, _)| id.clone())
            .collect())
    }
}
