//! Work queue backends.
//!
//! A [`WorkQueue`] hands out one [`Delivery`] at a time and expects it to be
//! settled exactly once with [`WorkQueue::ack`], [`WorkQueue::reject`] or
//! [`WorkQueue::dead_letter`] before the owning consumer asks for the next one.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::QueueResult;
use crate::jobs::JobMessage;

mod memory;
mod redis;

pub use memory::{MemoryWorkQueue, Settlement};
pub use redis::RedisWorkQueue;

/// One message handed to a consumer, pending settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Queue-assigned message id.
    pub id: String,
    /// Job body as submitted by the producer.
    pub body: String,
    /// How many times this message has been requeued before.
    pub redeliveries: u32,
    /// Backend handle used to settle the delivery.
    pub(crate) receipt: String,
}

/// Stored form of a queued message.
///
/// Carries the redelivery counter alongside the producer's body so the cap
/// survives round trips through the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Envelope {
    pub id: String,
    #[serde(default)]
    pub redeliveries: u32,
    pub body: String,
}

impl Envelope {
    pub(crate) fn new(body: String) -> Self {
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            redeliveries: 0,
            body,
        }
    }

    /// Parse a stored element. Elements pushed by foreign producers that are
    /// not envelopes are treated as a bare body on its first delivery.
    pub(crate) fn parse(stored: &str) -> Self {
        serde_json::from_str(stored).unwrap_or_else(|_| Self {
            id: String::new(),
            redeliveries: 0,
            body: stored.to_string(),
        })
    }

    pub(crate) fn redelivered(&self) -> Self {
        Self {
            id: self.id.clone(),
            redeliveries: self.redeliveries.saturating_add(1),
            body: self.body.clone(),
        }
    }

    pub(crate) fn into_delivery(self, receipt: String) -> Delivery {
        Delivery {
            id: self.id,
            body: self.body,
            redeliveries: self.redeliveries,
            receipt,
        }
    }
}

/// Durable work queue with manual acknowledgment.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Append a raw body to the queue.
    async fn publish(&self, body: String) -> QueueResult<()>;

    /// Wait up to `timeout` for the next delivery.
    async fn next_delivery(&self, timeout: Duration) -> QueueResult<Option<Delivery>>;

    /// Settle a delivery as processed; it is never redelivered.
    async fn ack(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Settle a delivery as failed. With `requeue` it is delivered again,
    /// otherwise it is discarded.
    async fn reject(&self, delivery: &Delivery, requeue: bool) -> QueueResult<()>;

    /// Settle a delivery by moving it to the dead letter sink.
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> QueueResult<()>;

    /// Return deliveries left unsettled by a previous run of this consumer.
    async fn recover_in_flight(&self) -> QueueResult<usize> {
        Ok(0)
    }

    /// Encode and append a job message.
    async fn enqueue(&self, job: &JobMessage) -> QueueResult<()> {
        self.publish(job.encode()?).await
    }
}
