//! Queue consumer.
//!
//! Pulls one delivery at a time, runs the job and settles the delivery
//! before asking for the next one:
//!
//! ```text
//! received ─► decoding ─┬─► rejected (no requeue)
//!                       └─► executing ─► publishing outcome ─┬─► acked
//!                                                            ├─► rejected (requeue)
//!                                                            └─► dead-lettered
//! ```
//!
//! A delivery that arrives already past the redelivery cap is dead-lettered
//! without being decoded or executed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::backend::{Delivery, WorkQueue};
use crate::error::QueueResult;
use crate::executor::JobExecutor;
use crate::jobs::{JobMessage, JobOutcome};
use crate::publisher::ResultPublisher;
use crate::retry::RedeliveryPolicy;

/// How a delivery was settled by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed; the job outcome was handed to the publisher.
    Acked,
    /// Rejected. Permanent failures are not requeued.
    Rejected {
        /// Whether the message went back to the queue.
        requeue: bool,
    },
    /// Transient failure with the redelivery cap exhausted.
    DeadLettered,
}

/// Settings shared by every consumer in a process.
#[derive(Debug, Clone, Copy)]
pub struct ConsumerSettings {
    /// Redelivery cap for transient failures.
    pub redelivery: RedeliveryPolicy,
    /// Longest single wait for a delivery before re-checking for shutdown.
    pub poll_timeout: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            redelivery: RedeliveryPolicy::default(),
            poll_timeout: Duration::from_secs(5),
        }
    }
}

/// Consumer of the work queue with a prefetch of one.
pub struct QueueConsumer {
    name: String,
    queue: Arc<dyn WorkQueue>,
    executor: Arc<dyn JobExecutor>,
    publisher: ResultPublisher,
    settings: ConsumerSettings,
}

impl QueueConsumer {
    /// Create a consumer.
    pub fn new(
        name: impl Into<String>,
        queue: Arc<dyn WorkQueue>,
        executor: Arc<dyn JobExecutor>,
        publisher: ResultPublisher,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            name: name.into(),
            queue,
            executor,
            publisher,
            settings,
        }
    }

    /// Consumer name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consume until `shutdown` flips to `true`.
    ///
    /// Shutdown is observed between deliveries only, so a running job always
    /// completes and is settled. Broker errors end the loop with an error.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> QueueResult<()> {
        self.queue.recover_in_flight().await?;
        info!(consumer = %self.name, "Queue consumer started");

        while !*shutdown.borrow() {
            let Some(delivery) = self.queue.next_delivery(self.settings.poll_timeout).await? else {
                continue;
            };
            self.handle_delivery(&delivery).await?;
        }

        info!(consumer = %self.name, "Queue consumer stopped");
        Ok(())
    }

    /// Process one delivery to settlement.
    pub async fn handle_delivery(&self, delivery: &Delivery) -> QueueResult<Disposition> {
        debug!(
            consumer = %self.name,
            delivery_id = %delivery.id,
            redeliveries = delivery.redeliveries,
            "Received delivery"
        );

        if self.settings.redelivery.is_exhausted(delivery.redeliveries) {
            error!(
                consumer = %self.name,
                delivery_id = %delivery.id,
                redeliveries = delivery.redeliveries,
                "Message keeps coming back unsettled, dead-lettering it"
            );
            self.queue
                .dead_letter(delivery, "redelivery cap exceeded by unsettled deliveries")
                .await?;
            return Ok(Disposition::DeadLettered);
        }

        let job = match JobMessage::decode(&delivery.body) {
            Ok(job) => job,
            Err(e) => {
                warn!(
                    consumer = %self.name,
                    delivery_id = %delivery.id,
                    error = %e,
                    "Rejecting undecodable message"
                );
                self.queue.reject(delivery, false).await?;
                return Ok(Disposition::Rejected { requeue: false });
            }
        };

        info!(consumer = %self.name, task_id = %job.task_id, action = %job.action, "Executing job");

        let outcome = match self.executor.execute(&job.task_id).await {
            Ok(location) => {
                info!(task_id = %job.task_id, artifact = %location, "Job completed");
                JobOutcome::completed(job.task_id.as_str(), location)
            }
            Err(e) => {
                warn!(task_id = %job.task_id, error = %e, "Job failed");
                JobOutcome::failed(job.task_id.as_str(), e.to_string())
            }
        };

        if let Err(e) = self.publisher.publish(&outcome) {
            error!(task_id = %job.task_id, error = %e, "Failed to serialize job outcome");
            return self.retry_later(delivery, &e.to_string()).await;
        }

        match self.queue.ack(delivery).await {
            Ok(()) => {
                debug!(task_id = %job.task_id, "Delivery acknowledged");
                Ok(Disposition::Acked)
            }
            Err(e) => {
                warn!(task_id = %job.task_id, error = %e, "Acknowledgment failed");
                self.retry_later(delivery, &e.to_string()).await
            }
        }
    }

    async fn retry_later(&self, delivery: &Delivery, reason: &str) -> QueueResult<Disposition> {
        if self.settings.redelivery.should_requeue(delivery.redeliveries) {
            self.queue.reject(delivery, true).await?;
            return Ok(Disposition::Rejected { requeue: true });
        }

        error!(
            consumer = %self.name,
            delivery_id = %delivery.id,
            redeliveries = delivery.redeliveries,
            reason,
            "Redelivery cap reached, dead-lettering message"
        );
        self.queue.dead_letter(delivery, reason).await?;
        Ok(Disposition::DeadLettered)
    }
}
