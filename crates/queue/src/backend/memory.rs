//! In-process work queue.
//!
//! Follows the same settlement contract as the Redis backend and records
//! every settlement, which makes consumer behaviour observable in tests.
//!
//! Handles made with [`MemoryWorkQueue::for_consumer`] share one queue but
//! own their deliveries, the way each Redis consumer owns its in-flight list.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fred::error::{Error as RedisError, ErrorKind as RedisErrorKind};
use tokio::sync::{Mutex, Notify};

use super::{Delivery, Envelope, WorkQueue};
use crate::error::{QueueError, QueueResult};
use crate::retry::DeadLetterEntry;

const DEFAULT_CONSUMER: &str = "default";

/// How a delivery was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Settlement {
    Acked { body: String },
    Rejected { body: String, requeue: bool },
    DeadLettered { body: String, reason: String },
}

struct InFlight {
    consumer: Arc<str>,
    envelope: Envelope,
}

#[derive(Default)]
struct MemoryState {
    ready: VecDeque<Envelope>,
    in_flight: HashMap<String, InFlight>,
    settlements: Vec<Settlement>,
    dead: Vec<DeadLetterEntry>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<MemoryState>,
    available: Notify,
    failing_acks: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Work queue held in process memory.
///
/// Cloning yields a handle for the same consumer.
#[derive(Clone)]
pub struct MemoryWorkQueue {
    shared: Arc<Shared>,
    consumer: Arc<str>,
}

impl Default for MemoryWorkQueue {
    fn default() -> Self {
        Self {
            shared: Arc::default(),
            consumer: Arc::from(DEFAULT_CONSUMER),
        }
    }
}

impl MemoryWorkQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle on the same queue for the consumer `consumer_id`.
    ///
    /// Deliveries taken through the handle can only be settled or recovered
    /// by handles with the same id.
    #[must_use]
    pub fn for_consumer(&self, consumer_id: &str) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            consumer: Arc::from(consumer_id),
        }
    }

    /// Make the next `count` acknowledgments fail as if the broker refused them.
    pub fn fail_next_acks(&self, count: usize) {
        self.shared.failing_acks.store(count, Ordering::SeqCst);
    }

    /// Every settlement so far, in order.
    pub async fn settlements(&self) -> Vec<Settlement> {
        self.shared.state.lock().await.settlements.clone()
    }

    /// Messages parked in the dead letter sink.
    pub async fn dead_letters(&self) -> Vec<DeadLetterEntry> {
        self.shared.state.lock().await.dead.clone()
    }

    /// Bodies waiting for delivery, oldest first.
    pub async fn pending(&self) -> Vec<String> {
        self.shared
            .state
            .lock()
            .await
            .ready
            .iter()
            .map(|e| e.body.clone())
            .collect()
    }

    /// Number of delivered but unsettled messages across all consumers.
    pub async fn in_flight(&self) -> usize {
        self.shared.state.lock().await.in_flight.len()
    }

    /// Highest number of simultaneously unsettled messages observed.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::SeqCst)
    }

    fn take_in_flight(
        &self,
        state: &mut MemoryState,
        delivery: &Delivery,
    ) -> QueueResult<Envelope> {
        let owned = state
            .in_flight
            .get(&delivery.receipt)
            .is_some_and(|entry| entry.consumer == self.consumer);
        if !owned {
            return Err(QueueError::UnknownDelivery(delivery.id.clone()));
        }

        state
            .in_flight
            .remove(&delivery.receipt)
            .map(|entry| entry.envelope)
            .ok_or_else(|| QueueError::UnknownDelivery(delivery.id.clone()))
    }

    fn take_ack_failure(&self) -> bool {
        self.shared
            .failing_acks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn publish(&self, body: String) -> QueueResult<()> {
        self.shared
            .state
            .lock()
            .await
            .ready
            .push_back(Envelope::new(body));
        self.shared.available.notify_one();
        Ok(())
    }

    async fn next_delivery(&self, timeout: Duration) -> QueueResult<Option<Delivery>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut state = self.shared.state.lock().await;
                if let Some(envelope) = state.ready.pop_front() {
                    let receipt = ulid::Ulid::new().to_string();
                    state.in_flight.insert(
                        receipt.clone(),
                        InFlight {
                            consumer: Arc::clone(&self.consumer),
                            envelope: envelope.clone(),
                        },
                    );
                    self.shared
                        .max_in_flight
                        .fetch_max(state.in_flight.len(), Ordering::SeqCst);
                    return Ok(Some(envelope.into_delivery(receipt)));
                }
            }

            if tokio::time::timeout_at(deadline, self.shared.available.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        if self.take_ack_failure() {
            return Err(QueueError::Redis(RedisError::new(
                RedisErrorKind::IO,
                "injected acknowledgment failure",
            )));
        }

        let mut state = self.shared.state.lock().await;
        self.take_in_flight(&mut state, delivery)?;
        state.settlements.push(Settlement::Acked {
            body: delivery.body.clone(),
        });
        Ok(())
    }

    async fn reject(&self, delivery: &Delivery, requeue: bool) -> QueueResult<()> {
        let mut state = self.shared.state.lock().await;
        let envelope = self.take_in_flight(&mut state, delivery)?;
        state.settlements.push(Settlement::Rejected {
            body: delivery.body.clone(),
            requeue,
        });
        if requeue {
            state.ready.push_front(envelope.redelivered());
            drop(state);
            self.shared.available.notify_one();
        }
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> QueueResult<()> {
        let mut state = self.shared.state.lock().await;
        self.take_in_flight(&mut state, delivery)?;
        state.dead.push(DeadLetterEntry::new(
            delivery.body.as_str(),
            delivery.redeliveries,
            reason,
        ));
        state.settlements.push(Settlement::DeadLettered {
            body: delivery.body.clone(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn recover_in_flight(&self) -> QueueResult<usize> {
        let mut state = self.shared.state.lock().await;
        let orphaned: Vec<String> = state
            .in_flight
            .iter()
            .filter(|(_, entry)| entry.consumer == self.consumer)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in &orphaned {
            if let Some(entry) = state.in_flight.remove(receipt) {
                state.ready.push_back(entry.envelope.redelivered());
            }
        }
        drop(state);

        if !orphaned.is_empty() {
            self.shared.available.notify_one();
        }
        Ok(orphaned.len())
    }
}
