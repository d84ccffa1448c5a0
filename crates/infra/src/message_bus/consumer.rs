//! Completion consumer: applies worker results from `jobs-finished` to the job store.
//!
//! Deliveries are handled one at a time, in arrival order, at most `prefetch` per
//! read. A delivery is acknowledged only after its store update succeeded; one that
//! could not be applied stays pending and is read again after `retry_delay`. On
//! start-up the consumer drains its own pending deliveries before reading new ones.
//!
//! The consumer never touches the pending index; the watchdog cleans it up later.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use switchyard_core::{FinishJobMessage, JobId, JobStatus, unix_now};

use crate::broker::{Delivery, JOBS_FINISHED_QUEUE, MessageBroker, ReadFrom, SCHEDULER_GROUP, Subscription};
use crate::error::SchedulerResult;
use crate::jobs::JobStore;

/// How long one receive waits for new deliveries before checking back.
const RECEIVE_BLOCK: Duration = Duration::from_secs(5);

/// What happened to a single delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The job record now carries the reported status.
    Resolved,
    /// No record for the job id; acknowledged without writing.
    UnknownJob,
    /// Payload can never be applied; moved to the dead-letter queue.
    DeadLettered,
}

pub struct CompletionConsumer {
    store: Arc<dyn JobStore>,
    broker: Arc<dyn MessageBroker>,
    subscription: Subscription,
    prefetch: usize,
    retry_delay: Duration,
    receive_block: Duration,
}

impl CompletionConsumer {
    pub fn new(
        store: Arc<dyn JobStore>,
        broker: Arc<dyn MessageBroker>,
        consumer_name: impl Into<String>,
        prefetch: usize,
        retry_delay: Duration,
    ) -> Self {
        Self {
            store,
            broker,
            subscription: Subscription::new(JOBS_FINISHED_QUEUE, SCHEDULER_GROUP, consumer_name),
            prefetch: prefetch.max(1),
            retry_delay,
            receive_block: RECEIVE_BLOCK,
        }
    }

    /// Override how long a receive blocks (shorter in tests).
    pub fn with_receive_block(mut self, block: Duration) -> Self {
        self.receive_block = block;
        self
    }

    /// Consume until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(consumer = %self.subscription.consumer, prefetch = self.prefetch, "completion consumer started");

        let mut from = ReadFrom::Pending;
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.broker.receive(&self.subscription, from, self.prefetch, self.receive_block) => received,
            };

            let batch = match received {
                Ok(batch) => batch,
                Err(e) => {
                    error!(error = %e, "failed to receive completions");
                    if !pause(&cancel, self.retry_delay).await {
                        break;
                    }
                    continue;
                }
            };

            if batch.is_empty() {
                // Pending list drained; switch to new deliveries.
                from = ReadFrom::New;
                continue;
            }

            let mut left_pending = 0usize;
            for delivery in &batch {
                if let Err(e) = self.handle_delivery(delivery).await {
                    left_pending += 1;
                    warn!(
                        message_id = %delivery.id,
                        error = %e,
                        "completion not applied; left for redelivery"
                    );
                }
            }

            if left_pending > 0 {
                from = ReadFrom::Pending;
                if !pause(&cancel, self.retry_delay).await {
                    break;
                }
            }
        }

        info!(consumer = %self.subscription.consumer, "completion consumer stopped");
    }

    /// Apply one delivery and acknowledge it.
    ///
    /// Returns an error (and leaves the delivery unacknowledged) only when the
    /// store or broker failed, i.e. when a redelivery can succeed.
    pub async fn handle_delivery(&self, delivery: &Delivery) -> SchedulerResult<CompletionOutcome> {
        let message = match serde_json::from_str::<FinishJobMessage>(&delivery.payload) {
            Ok(message) => message,
            Err(e) => {
                return self
                    .reject(delivery, &format!("undecodable completion: {e}"))
                    .await;
            }
        };

        let id = match JobId::from_str(&message.job_id) {
            Ok(id) => id,
            Err(e) => return self.reject(delivery, &e.to_string()).await,
        };

        let status = JobStatus::from(message.status);
        let applied = self
            .store
            .resolve(id, status, &message.message, unix_now())
            .await?;

        let outcome = if applied {
            debug!(job_id = %id, status = %status, "job resolved");
            CompletionOutcome::Resolved
        } else {
            warn!(job_id = %id, status = %status, "completion for unknown job");
            CompletionOutcome::UnknownJob
        };

        self.broker.ack(&self.subscription, &delivery.id).await?;
        Ok(outcome)
    }

    async fn reject(&self, delivery: &Delivery, reason: &str) -> SchedulerResult<CompletionOutcome> {
        self.broker
            .dead_letter(&self.subscription, delivery, reason)
            .await?;
        self.broker.ack(&self.subscription, &delivery.id).await?;
        Ok(CompletionOutcome::DeadLettered)
    }
}

/// Sleep for `delay` unless cancelled first. Returns `false` on cancellation.
async fn pause(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
