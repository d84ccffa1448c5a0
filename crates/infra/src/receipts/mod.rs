//! Permanent job receipts (relational store) and statistics over them.

pub mod postgres;

use std::sync::RwLock;

use async_trait::async_trait;

use switchyard_core::{JobId, JobReceipt, JobStatistics};

pub use postgres::PostgresReceiptStore;

/// Receipt store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReceiptStoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Append-only store of terminal job outcomes.
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    /// Write a receipt. At most one receipt exists per job id: returns `false` and
    /// writes nothing if one is already stored.
    async fn insert(&self, receipt: &JobReceipt) -> Result<bool, ReceiptStoreError>;

    /// Aggregate all receipts for `job_name`. Unknown names yield zero counts.
    async fn statistics(&self, job_name: &str) -> Result<JobStatistics, ReceiptStoreError>;
}

/// In-memory receipt store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryReceiptStore {
    receipts: RwLock<Vec<JobReceipt>>,
}

impl InMemoryReceiptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored receipts, in insertion order.
    pub fn all(&self) -> Vec<JobReceipt> {
        self.receipts.read().unwrap().clone()
    }

    /// Receipt for one job, if written.
    pub fn get(&self, job_id: JobId) -> Option<JobReceipt> {
        self.receipts
            .read()
            .unwrap()
            .iter()
            .find(|r| r.job_id == job_id)
            .cloned()
    }
}

#[async_trait]
impl ReceiptStore for InMemoryReceiptStore {
    async fn insert(&self, receipt: &JobReceipt) -> Result<bool, ReceiptStoreError> {
        let mut receipts = self.receipts.write().unwrap();
        if receipts.iter().any(|r| r.job_id == receipt.job_id) {
            return Ok(false);
        }
        receipts.push(receipt.clone());
        Ok(true)
    }

    async fn statistics(&self, job_name: &str) -> Result<JobStatistics, ReceiptStoreError> {
        let receipts = self.receipts.read().unwrap();
        Ok(JobStatistics::from_receipts(job_name, receipts.iter()))
    }
}
