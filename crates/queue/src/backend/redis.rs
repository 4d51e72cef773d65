//! Redis list backed work queue.
//!
//! Producers `LPUSH` onto the queue list. Each consumer `BRPOPLPUSH`es the
//! oldest element into its own in-flight list, so a message is owned by at
//! most one consumer and survives a consumer crash until the next
//! [`WorkQueue::recover_in_flight`], which returns it with its redelivery
//! counter bumped.

use std::time::Duration;

use async_trait::async_trait;
use fred::clients::Client;
use fred::interfaces::ListInterface;
use tracing::{debug, info, warn};

use super::{Delivery, Envelope, WorkQueue};
use crate::connection::{ConnectionTask, connect_client};
use crate::error::QueueResult;
use crate::retry::DeadLetterEntry;

/// Work queue stored in Redis lists.
#[derive(Clone)]
pub struct RedisWorkQueue {
    client: Client,
    queue: String,
    processing: String,
    dead: String,
}

impl RedisWorkQueue {
    /// Wrap an already connected client.
    ///
    /// Blocking dequeues occupy the connection, so every consumer needs its
    /// own client. Producers may share one.
    #[must_use]
    pub fn new(client: Client, queue: &str, consumer_id: &str) -> Self {
        Self {
            client,
            queue: queue.to_string(),
            processing: format!("{queue}:processing:{consumer_id}"),
            dead: format!("{queue}:dead"),
        }
    }

    /// Connect a dedicated client for one consumer.
    pub async fn connect(
        redis_url: &str,
        queue: &str,
        consumer_id: &str,
    ) -> QueueResult<(Self, ConnectionTask)> {
        let (client, task) = connect_client(redis_url).await?;
        Ok((Self::new(client, queue, consumer_id), task))
    }

    /// Name of the queue list.
    #[must_use]
    pub fn queue_key(&self) -> &str {
        &self.queue
    }

    /// Name of this consumer's in-flight list.
    #[must_use]
    pub fn processing_key(&self) -> &str {
        &self.processing
    }

    /// Name of the dead letter list.
    #[must_use]
    pub fn dead_letter_key(&self) -> &str {
        &self.dead
    }

    /// Number of messages waiting in the queue.
    pub async fn len(&self) -> QueueResult<usize> {
        let len: usize = self.client.llen(self.queue.as_str()).await?;
        Ok(len)
    }

    /// Check whether the queue has no waiting messages.
    pub async fn is_empty(&self) -> QueueResult<bool> {
        Ok(self.len().await? == 0)
    }

    async fn settle(&self, delivery: &Delivery) -> QueueResult<()> {
        let removed: i64 = self
            .client
            .lrem(self.processing.as_str(), 1, delivery.receipt.as_str())
            .await?;
        if removed == 0 {
            warn!(
                queue = %self.queue,
                delivery_id = %delivery.id,
                "Settled delivery was not in the in-flight list"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl WorkQueue for RedisWorkQueue {
    async fn publish(&self, body: String) -> QueueResult<()> {
        let envelope = Envelope::new(body);
        let stored = serde_json::to_string(&envelope)?;
        let _: i64 = self.client.lpush(self.queue.as_str(), stored).await?;
        debug!(queue = %self.queue, delivery_id = %envelope.id, "Message enqueued");
        Ok(())
    }

    async fn next_delivery(&self, timeout: Duration) -> QueueResult<Option<Delivery>> {
        let stored: Option<String> = self
            .client
            .brpoplpush(
                self.queue.as_str(),
                self.processing.as_str(),
                timeout.as_secs_f64(),
            )
            .await?;

        Ok(stored.map(|stored| Envelope::parse(&stored).into_delivery(stored)))
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        self.settle(delivery).await
    }

    async fn reject(&self, delivery: &Delivery, requeue: bool) -> QueueResult<()> {
        if requeue {
            let again = Envelope::parse(&delivery.receipt).redelivered();
            let stored = serde_json::to_string(&again)?;
            // Pushed on the consuming end so it is the next message delivered.
            let _: i64 = self.client.rpush(self.queue.as_str(), stored).await?;
        }
        self.settle(delivery).await
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> QueueResult<()> {
        let entry = DeadLetterEntry::new(delivery.body.as_str(), delivery.redeliveries, reason);
        let stored = serde_json::to_string(&entry)?;
        let _: i64 = self.client.lpush(self.dead.as_str(), stored).await?;
        self.settle(delivery).await
    }

    async fn recover_in_flight(&self) -> QueueResult<usize> {
        let mut recovered = 0;
        loop {
            // Copy before removing, so a crash here duplicates rather than loses.
            let stored: Option<String> = self.client.lindex(self.processing.as_str(), -1).await?;
            let Some(stored) = stored else {
                break;
            };

            let again = serde_json::to_string(&Envelope::parse(&stored).redelivered())?;
            let _: i64 = self.client.lpush(self.queue.as_str(), again).await?;
            let _: Option<String> = self.client.rpop(self.processing.as_str(), None).await?;
            recovered += 1;
        }

        if recovered > 0 {
            info!(
                queue = %self.queue,
                processing = %self.processing,
                recovered,
                "Returned unsettled deliveries to the queue"
            );
        }
        Ok(recovered)
    }
}
