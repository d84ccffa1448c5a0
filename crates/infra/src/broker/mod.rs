//! Message broker boundary (durable queues between the scheduler and workers).
//!
//! ## Queues
//!
//! - `jobs`: scheduler → workers, one [`JobMessage`](switchyard_core::JobMessage) per
//!   enqueue or retry
//! - `jobs-finished`: workers → scheduler, one
//!   [`FinishJobMessage`](switchyard_core::FinishJobMessage) per attempt
//! - `<queue>:dlq`: deliveries that can never be processed
//!
//! ## Delivery guarantees
//!
//! At-least-once. A delivery handed out by [`MessageBroker::receive`] stays pending
//! for its consumer group until [`MessageBroker::ack`] is called; reading with
//! [`ReadFrom::Pending`] hands it out again. Consumers must therefore be
//! idempotent.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_streams;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

pub use in_memory::InMemoryBroker;
#[cfg(feature = "redis")]
pub use redis_streams::RedisStreamsBroker;

/// Work queue consumed by worker processes.
pub const JOBS_QUEUE: &str = "jobs";

/// Completion queue consumed by the scheduler.
pub const JOBS_FINISHED_QUEUE: &str = "jobs-finished";

/// Consumer group the scheduler reads `jobs-finished` with.
pub const SCHEDULER_GROUP: &str = "scheduler";

/// Consumer group workers read `jobs` with. Declared by the scheduler so messages
/// published before the first worker connects are not skipped.
pub const WORKER_GROUP: &str = "workers";

/// Dead-letter queue name for `queue`.
pub fn dead_letter_queue(queue: &str) -> String {
    format!("{queue}:dlq")
}

/// A message handed to a consumer, not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Broker-assigned message id (used for ack).
    pub id: String,
    /// Raw JSON payload.
    pub payload: String,
}

/// Where a read starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFrom {
    /// Deliveries already handed to this consumer but never acknowledged (redelivery).
    Pending,
    /// Messages never delivered to the group before.
    New,
}

/// Identity of a consumer reading one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub queue: String,
    pub group: String,
    pub consumer: String,
}

impl Subscription {
    pub fn new(
        queue: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Self {
        Self {
            queue: queue.into(),
            group: group.into(),
            consumer: consumer.into(),
        }
    }
}

/// Broker error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    #[error("broker connection error: {0}")]
    Connection(String),
    #[error("broker command error: {0}")]
    Command(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Durable, at-least-once message broker.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Ensure `queue` exists and `group` can consume it from the beginning (idempotent).
    async fn declare(&self, queue: &str, group: &str) -> Result<(), BrokerError>;

    /// Append a message to `queue`. The broker keeps it across restarts.
    /// Returns the broker-assigned message id.
    async fn publish(&self, queue: &str, payload: &str) -> Result<String, BrokerError>;

    /// Read up to `max` deliveries. For [`ReadFrom::New`] waits at most `block` when
    /// nothing is available; returns an empty batch on timeout.
    async fn receive(
        &self,
        subscription: &Subscription,
        from: ReadFrom,
        max: usize,
        block: Duration,
    ) -> Result<Vec<Delivery>, BrokerError>;

    /// Acknowledge a delivery; it will not be handed out again.
    async fn ack(&self, subscription: &Subscription, delivery_id: &str) -> Result<(), BrokerError>;

    /// Copy a delivery to the queue's dead-letter queue with a reason.
    /// Does not acknowledge it.
    async fn dead_letter(
        &self,
        subscription: &Subscription,
        delivery: &Delivery,
        reason: &str,
    ) -> Result<(), BrokerError>;
}

/// Serialize `message` as JSON and publish it.
pub async fn publish_json<T: Serialize + Sync>(
    broker: &dyn MessageBroker,
    queue: &str,
    message: &T,
) -> Result<String, BrokerError> {
    let payload =
        serde_json::to_string(message).map_err(|e| BrokerError::Serialization(e.to_string()))?;
    broker.publish(queue, &payload).await
}
