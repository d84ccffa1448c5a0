//! Redis Streams-backed broker (durable, at-least-once delivery).
//!
//! - **Queue**: one stream per queue name (`jobs`, `jobs-finished`)
//! - **Consumer groups**: created from id `0` so earlier messages are not skipped
//! - **Redelivery**: unacknowledged entries stay in the group's pending list and are
//!   read back with id `0`
//! - **Dead-letter queue**: `<queue>:dlq`, one entry per rejected delivery

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::StreamReadReply;
use tracing::{instrument, warn};

use super::{BrokerError, Delivery, MessageBroker, ReadFrom, Subscription, dead_letter_queue};

/// Stream field holding the JSON payload.
const PAYLOAD_FIELD: &str = "payload";

/// Redis Streams broker.
///
/// Blocking reads get their own connection so a parked `XREADGROUP` never delays
/// publishes and acks multiplexed on the command connection.
#[derive(Clone)]
pub struct RedisStreamsBroker {
    conn: ConnectionManager,
    read_conn: ConnectionManager,
}

impl RedisStreamsBroker {
    /// Connect to Redis (e.g. "redis://localhost:6379").
    pub async fn connect(redis_url: &str) -> Result<Self, BrokerError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| BrokerError::Connection(e.to_string()))?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let read_conn = ConnectionManager::new(client)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        Ok(Self { conn, read_conn })
    }
}

fn command_err(op: &str, e: redis::RedisError) -> BrokerError {
    BrokerError::Command(format!("{op} failed: {e}"))
}

#[async_trait]
impl MessageBroker for RedisStreamsBroker {
    async fn declare(&self, queue: &str, group: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let created: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(queue)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match created {
            Ok(()) => Ok(()),
            // Group already exists.
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(command_err("XGROUP CREATE", e)),
        }
    }

    #[instrument(skip(self, payload), fields(queue = %queue), err)]
    async fn publish(&self, queue: &str, payload: &str) -> Result<String, BrokerError> {
        let mut conn = self.conn.clone();
        redis::cmd("XADD")
            .arg(queue)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| command_err("XADD", e))
    }

    async fn receive(
        &self,
        subscription: &Subscription,
        from: ReadFrom,
        max: usize,
        block: Duration,
    ) -> Result<Vec<Delivery>, BrokerError> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&subscription.group)
            .arg(&subscription.consumer)
            .arg("COUNT")
            .arg(max.max(1));

        let start_id = match from {
            ReadFrom::Pending => "0",
            ReadFrom::New => {
                // BLOCK 0 would wait forever.
                let block_ms = u64::try_from(block.as_millis()).unwrap_or(u64::MAX).max(1);
                cmd.arg("BLOCK").arg(block_ms);
                ">"
            }
        };
        cmd.arg("STREAMS").arg(&subscription.queue).arg(start_id);

        let mut conn = self.read_conn.clone();
        let reply: Option<StreamReadReply> = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| command_err("XREADGROUP", e))?;

        let Some(reply) = reply else {
            return Ok(Vec::new());
        };

        let mut deliveries = Vec::new();
        for key in reply.keys {
            for entry in key.ids {
                // Entries trimmed from the stream come back with no fields; hand them
                // out with an empty payload so the consumer can reject and ack them.
                let payload = entry.get::<String>(PAYLOAD_FIELD).unwrap_or_default();
                deliveries.push(Delivery {
                    id: entry.id,
                    payload,
                });
            }
        }
        Ok(deliveries)
    }

    async fn ack(&self, subscription: &Subscription, delivery_id: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let _: u64 = redis::cmd("XACK")
            .arg(&subscription.queue)
            .arg(&subscription.group)
            .arg(delivery_id)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_err("XACK", e))?;
        Ok(())
    }

    async fn dead_letter(
        &self,
        subscription: &Subscription,
        delivery: &Delivery,
        reason: &str,
    ) -> Result<(), BrokerError> {
        let dlq = dead_letter_queue(&subscription.queue);
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("XADD")
            .arg(&dlq)
            .arg("*")
            .arg("original_message_id")
            .arg(&delivery.id)
            .arg("reason")
            .arg(reason)
            .arg("failed_at")
            .arg(chrono::Utc::now().to_rfc3339())
            .arg(PAYLOAD_FIELD)
            .arg(&delivery.payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_err("DLQ XADD", e))?;

        warn!(
            message_id = %delivery.id,
            dlq = %dlq,
            reason = %reason,
            "message sent to dead-letter queue"
        );
        Ok(())
    }
}
