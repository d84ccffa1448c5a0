//! Job store abstraction and the in-memory implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use switchyard_core::{JobId, JobRecord, JobStatus};

/// Key-value job store with a time-ordered pending index.
///
/// Every method is a single atomic store operation; the scheduler composes them
/// without cross-call transactions.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Write a new job record.
    async fn create(&self, record: &JobRecord) -> Result<(), JobStoreError>;

    /// Load a job record. `None` if the id is unknown.
    async fn get(&self, id: JobId) -> Result<Option<JobRecord>, JobStoreError>;

    /// Read just the status field. `None` if the id is unknown.
    async fn status(&self, id: JobId) -> Result<Option<JobStatus>, JobStoreError>;

    /// Set status, message and `updated_at` of an existing record.
    ///
    /// Returns `false` (and writes nothing) if the record does not exist.
    async fn resolve(
        &self,
        id: JobId,
        status: JobStatus,
        message: &str,
        now: i64,
    ) -> Result<bool, JobStoreError>;

    /// Increment `retry_count` by one and refresh `updated_at`. Returns the new count.
    async fn record_retry(&self, id: JobId, now: i64) -> Result<u32, JobStoreError>;

    /// Insert or re-score a job in the pending index.
    async fn index_pending(&self, id: JobId, score: i64) -> Result<(), JobStoreError>;

    /// Ids in the pending index with score `<= cutoff`, oldest first.
    async fn pending_before(&self, cutoff: i64) -> Result<Vec<JobId>, JobStoreError>;

    /// Remove a job from the pending index (no-op if absent).
    async fn remove_pending(&self, id: JobId) -> Result<(), JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job store connection error: {0}")]
    Connection(String),
    #[error("job store command error: {0}")]
    Command(String),
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("corrupt job record {id}: {detail}")]
    Corrupt { id: String, detail: String },
    #[error("serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Default)]
struct State {
    records: HashMap<JobId, JobRecord>,
    pending: HashMap<JobId, i64>,
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    state: Mutex<State>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score of a job in the pending index, if indexed.
    pub fn pending_score(&self, id: JobId) -> Option<i64> {
        self.state.lock().unwrap().pending.get(&id).copied()
    }

    /// Number of entries in the pending index.
    pub fn pending_len(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// Number of job records.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite a record as-is (test setup for arbitrary states).
    pub fn put(&self, record: JobRecord) {
        self.state.lock().unwrap().records.insert(record.id, record);
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, record: &JobRecord) -> Result<(), JobStoreError> {
        self.state
            .lock()
            .unwrap()
            .records
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<JobRecord>, JobStoreError> {
        Ok(self.state.lock().unwrap().records.get(&id).cloned())
    }

    async fn status(&self, id: JobId) -> Result<Option<JobStatus>, JobStoreError> {
        Ok(self.state.lock().unwrap().records.get(&id).map(|r| r.status))
    }

    async fn resolve(
        &self,
        id: JobId,
        status: JobStatus,
        message: &str,
        now: i64,
    ) -> Result<bool, JobStoreError> {
        let mut state = self.state.lock().unwrap();
        match state.records.get_mut(&id) {
            Some(record) => {
                record.resolve(status, message, now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_retry(&self, id: JobId, now: i64) -> Result<u32, JobStoreError> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .records
            .get_mut(&id)
            .ok_or(JobStoreError::NotFound(id))?;
        record.record_retry(now);
        Ok(record.retry_count)
    }

    async fn index_pending(&self, id: JobId, score: i64) -> Result<(), JobStoreError> {
        self.state.lock().unwrap().pending.insert(id, score);
        Ok(())
    }

    async fn pending_before(&self, cutoff: i64) -> Result<Vec<JobId>, JobStoreError> {
        let state = self.state.lock().unwrap();
        let mut due: Vec<(i64, JobId)> = state
            .pending
            .iter()
            .filter(|(_, score)| **score <= cutoff)
            .map(|(id, score)| (*score, *id))
            .collect();
        due.sort();
        Ok(due.into_iter().map(|(_, id)| id).collect())
    }

    async fn remove_pending(&self, id: JobId) -> Result<(), JobStoreError> {
        self.state.lock().unwrap().pending.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::JobContext;

    fn pending_job(now: i64) -> JobRecord {
        JobRecord::pending(JobId::new(), "test", JobContext::new(), now)
    }

    #[tokio::test]
    async fn create_and_read_back() {
        let store = InMemoryJobStore::new();
        let record = pending_job(10);
        store.create(&record).await.unwrap();

        assert_eq!(store.get(record.id).await.unwrap(), Some(record.clone()));
        assert_eq!(store.status(record.id).await.unwrap(), Some(JobStatus::Pending));
        assert_eq!(store.status(JobId::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn pending_before_is_inclusive_and_ordered() {
        let store = InMemoryJobStore::new();
        let (a, b, c) = (JobId::new(), JobId::new(), JobId::new());
        store.index_pending(a, 30).await.unwrap();
        store.index_pending(b, 10).await.unwrap();
        store.index_pending(c, 31).await.unwrap();

        assert_eq!(store.pending_before(30).await.unwrap(), vec![b, a]);

        store.remove_pending(b).await.unwrap();
        store.remove_pending(b).await.unwrap();
        assert_eq!(store.pending_before(100).await.unwrap(), vec![a, c]);
    }

    #[tokio::test]
    async fn resolve_unknown_job_writes_nothing() {
        let store = InMemoryJobStore::new();
        let applied = store
            .resolve(JobId::new(), JobStatus::Ok, "done", 5)
            .await
            .unwrap();

        assert!(!applied);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn record_retry_requires_existing_job() {
        let store = InMemoryJobStore::new();
        let record = pending_job(10);
        store.create(&record).await.unwrap();

        assert_eq!(store.record_retry(record.id, 20).await.unwrap(), 1);
        assert_eq!(store.record_retry(record.id, 30).await.unwrap(), 2);
        assert!(matches!(
            store.record_retry(JobId::new(), 30).await,
            Err(JobStoreError::NotFound(_))
        ));
    }
}
