//! Producer side of the job queue, plus the completion consumer.
//!
//! Enqueue is three independent store/broker operations with no rollback: a failure
//! after the record was written leaves a pending job the watchdog will eventually
//! retry. Enqueue is best-effort, not exactly-once.

pub mod consumer;

use std::sync::Arc;

use tracing::{info, instrument};

use switchyard_core::{JobContext, JobId, JobMessage, JobRecord, ScheduleJobRequest, unix_now};

use crate::broker::{JOBS_FINISHED_QUEUE, JOBS_QUEUE, MessageBroker, SCHEDULER_GROUP, WORKER_GROUP, publish_json};
use crate::error::SchedulerResult;
use crate::jobs::JobStore;

pub use consumer::{CompletionConsumer, CompletionOutcome};

/// Enqueues jobs: job record + pending index + work message.
#[derive(Clone)]
pub struct MessageBusService {
    store: Arc<dyn JobStore>,
    broker: Arc<dyn MessageBroker>,
}

impl MessageBusService {
    pub fn new(store: Arc<dyn JobStore>, broker: Arc<dyn MessageBroker>) -> Self {
        Self { store, broker }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Declare both queues with their consumer groups (idempotent).
    pub async fn declare_queues(&self) -> SchedulerResult<()> {
        self.broker.declare(JOBS_QUEUE, WORKER_GROUP).await?;
        self.broker.declare(JOBS_FINISHED_QUEUE, SCHEDULER_GROUP).await?;
        Ok(())
    }

    /// Enqueue a job for any worker subscribed to its name.
    pub async fn schedule_job(&self, request: &ScheduleJobRequest) -> SchedulerResult<JobId> {
        self.schedule_job_at(request, unix_now()).await
    }

    /// [`schedule_job`](Self::schedule_job) with an explicit clock.
    #[instrument(skip(self, request), fields(job_name = %request.job_name), err)]
    pub async fn schedule_job_at(
        &self,
        request: &ScheduleJobRequest,
        now: i64,
    ) -> SchedulerResult<JobId> {
        request.validate()?;

        let id = JobId::new();
        let record = JobRecord::pending(id, &request.job_name, request.job_context.clone(), now);

        self.store.create(&record).await?;
        self.store.index_pending(id, now).await?;
        self.send_retry_job_message(&request.job_name, &request.job_context, id)
            .await?;

        info!(job_id = %id, job_name = %request.job_name, "job scheduled");
        Ok(id)
    }

    /// Publish the work message for an existing job (initial enqueue and retries).
    pub async fn send_retry_job_message(
        &self,
        job_name: &str,
        job_context: &JobContext,
        id: JobId,
    ) -> SchedulerResult<()> {
        let message = JobMessage {
            job_name: job_name.to_string(),
            job_context: job_context.clone(),
            job_id: id.to_string(),
        };
        publish_json(self.broker.as_ref(), JOBS_QUEUE, &message).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::error::SchedulerError;
    use crate::jobs::InMemoryJobStore;
    use switchyard_core::{DomainError, JobStatus};

    fn service() -> (MessageBusService, Arc<InMemoryJobStore>, Arc<InMemoryBroker>) {
        let store = Arc::new(InMemoryJobStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        (
            MessageBusService::new(store.clone(), broker.clone()),
            store,
            broker,
        )
    }

    #[tokio::test]
    async fn schedule_writes_record_index_and_message() {
        let (bus, store, broker) = service();
        let mut context = JobContext::new();
        context.insert("width".into(), 640.into());

        let id = bus
            .schedule_job_at(&ScheduleJobRequest::new("resize", context.clone()), 1_000)
            .await
            .unwrap();

        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.message, "");
        assert_eq!(record.context, context);
        assert_eq!(store.pending_score(id), Some(1_000));

        let published = broker.published(JOBS_QUEUE);
        assert_eq!(published.len(), 1);
        let message: JobMessage = serde_json::from_str(&published[0]).unwrap();
        assert_eq!(message.job_id, id.to_string());
        assert_eq!(message.job_name, "resize");
        assert_eq!(message.job_context, context);
    }

    #[tokio::test]
    async fn blank_job_name_writes_nothing() {
        let (bus, store, broker) = service();

        let err = bus
            .schedule_job(&ScheduleJobRequest::new("  ", JobContext::new()))
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::Domain(DomainError::Validation(_))));
        assert!(store.is_empty());
        assert_eq!(store.pending_len(), 0);
        assert!(broker.published(JOBS_QUEUE).is_empty());
    }

    #[tokio::test]
    async fn every_schedule_gets_a_fresh_id() {
        let (bus, store, _) = service();
        let request = ScheduleJobRequest::new("N", JobContext::new());

        let a = bus.schedule_job(&request).await.unwrap();
        let b = bus.schedule_job(&request).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }
}
