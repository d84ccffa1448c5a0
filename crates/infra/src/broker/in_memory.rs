//! In-memory broker for tests/dev.
//!
//! Mirrors the consumer-group semantics of the Redis Streams broker: a cursor of
//! delivered messages per group, and a pending list of unacknowledged deliveries.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{BrokerError, Delivery, MessageBroker, ReadFrom, Subscription, dead_letter_queue};

#[derive(Debug, Default)]
struct GroupState {
    /// Index of the next never-delivered entry.
    cursor: usize,
    /// Delivered but unacknowledged, in delivery order.
    pending: Vec<Delivery>,
}

#[derive(Debug, Default)]
struct QueueState {
    entries: Vec<Delivery>,
    groups: HashMap<String, GroupState>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    queues: HashMap<String, QueueState>,
    /// (dead-letter queue, delivery, reason)
    dead_letters: Vec<(String, Delivery, String)>,
}

/// In-memory message broker.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    state: Mutex<State>,
    notify: Notify,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every payload ever published to `queue`, in order.
    pub fn published(&self, queue: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .queues
            .get(queue)
            .map(|q| q.entries.iter().map(|d| d.payload.clone()).collect())
            .unwrap_or_default()
    }

    /// Unacknowledged deliveries of `group` on `queue`.
    pub fn pending_count(&self, queue: &str, group: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .queues
            .get(queue)
            .and_then(|q| q.groups.get(group))
            .map_or(0, |g| g.pending.len())
    }

    /// Entries on `queue` that `group` has not read yet.
    pub fn undelivered_count(&self, queue: &str, group: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.queues.get(queue).map_or(0, |q| {
            let cursor = q.groups.get(group).map_or(0, |g| g.cursor);
            q.entries.len().saturating_sub(cursor)
        })
    }

    /// Dead-lettered deliveries for `queue` with their reasons.
    pub fn dead_letters(&self, queue: &str) -> Vec<(Delivery, String)> {
        let dlq = dead_letter_queue(queue);
        let state = self.state.lock().unwrap();
        state
            .dead_letters
            .iter()
            .filter(|(q, _, _)| *q == dlq)
            .map(|(_, d, reason)| (d.clone(), reason.clone()))
            .collect()
    }

    fn take(&self, subscription: &Subscription, from: ReadFrom, max: usize) -> Vec<Delivery> {
        let mut state = self.state.lock().unwrap();
        let queue = state.queues.entry(subscription.queue.clone()).or_default();
        let QueueState { entries, groups } = queue;
        let group = groups.entry(subscription.group.clone()).or_default();

        match from {
            ReadFrom::Pending => group.pending.iter().take(max).cloned().collect(),
            ReadFrom::New => {
                let end = (group.cursor + max).min(entries.len());
                let batch: Vec<Delivery> = entries[group.cursor..end].to_vec();
                group.cursor = end;
                group.pending.extend(batch.iter().cloned());
                batch
            }
        }
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn declare(&self, queue: &str, group: &str) -> Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        state
            .queues
            .entry(queue.to_string())
            .or_default()
            .groups
            .entry(group.to_string())
            .or_default();
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &str) -> Result<String, BrokerError> {
        let id = {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let id = format!("{}-0", state.next_id);
            state
                .queues
                .entry(queue.to_string())
                .or_default()
                .entries
                .push(Delivery {
                    id: id.clone(),
                    payload: payload.to_string(),
                });
            id
        };
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn receive(
        &self,
        subscription: &Subscription,
        from: ReadFrom,
        max: usize,
        block: Duration,
    ) -> Result<Vec<Delivery>, BrokerError> {
        let max = max.max(1);
        if from == ReadFrom::Pending {
            return Ok(self.take(subscription, from, max));
        }

        let deadline = Instant::now() + block;
        loop {
            // Register interest before checking, so a publish in between is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let batch = self.take(subscription, from, max);
            if !batch.is_empty() {
                return Ok(batch);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, subscription: &Subscription, delivery_id: &str) -> Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        if let Some(group) = state
            .queues
            .get_mut(&subscription.queue)
            .and_then(|q| q.groups.get_mut(&subscription.group))
        {
            group.pending.retain(|d| d.id != delivery_id);
        }
        Ok(())
    }

    async fn dead_letter(
        &self,
        subscription: &Subscription,
        delivery: &Delivery,
        reason: &str,
    ) -> Result<(), BrokerError> {
        self.state.lock().unwrap().dead_letters.push((
            dead_letter_queue(&subscription.queue),
            delivery.clone(),
            reason.to_string(),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub() -> Subscription {
        Subscription::new("q", "g", "c1")
    }

    #[tokio::test]
    async fn unacked_deliveries_are_redelivered_from_pending() {
        let broker = InMemoryBroker::new();
        broker.publish("q", "a").await.unwrap();
        broker.publish("q", "b").await.unwrap();

        let first = broker
            .receive(&sub(), ReadFrom::New, 10, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(first.len(), 2);

        broker.ack(&sub(), &first[0].id).await.unwrap();

        let again = broker
            .receive(&sub(), ReadFrom::Pending, 10, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(again, vec![first[1].clone()]);

        let fresh = broker
            .receive(&sub(), ReadFrom::New, 10, Duration::from_millis(10))
            .await
            .unwrap();
        assert!(fresh.is_empty());
    }

    #[tokio::test]
    async fn receive_respects_max() {
        let broker = InMemoryBroker::new();
        for i in 0..5 {
            broker.publish("q", &i.to_string()).await.unwrap();
        }

        let batch = broker
            .receive(&sub(), ReadFrom::New, 2, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(
            batch.iter().map(|d| d.payload.as_str()).collect::<Vec<_>>(),
            vec!["0", "1"]
        );
    }

    #[tokio::test]
    async fn blocked_receive_wakes_on_publish() {
        let broker = std::sync::Arc::new(InMemoryBroker::new());
        let reader = {
            let broker = broker.clone();
            tokio::spawn(async move {
                broker
                    .receive(&sub(), ReadFrom::New, 1, Duration::from_secs(5))
                    .await
                    .unwrap()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.publish("q", "late").await.unwrap();

        let batch = reader.await.unwrap();
        assert_eq!(batch[0].payload, "late");
    }

    #[tokio::test]
    async fn groups_have_independent_cursors() {
        let broker = InMemoryBroker::new();
        broker.publish("q", "x").await.unwrap();

        let other = Subscription::new("q", "other", "c9");
        let a = broker
            .receive(&sub(), ReadFrom::New, 10, Duration::ZERO)
            .await
            .unwrap();
        let b = broker
            .receive(&other, ReadFrom::New, 10, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(a, b);
    }
}
