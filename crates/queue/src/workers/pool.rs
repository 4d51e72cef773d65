//! A set of queue consumers running side by side.

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};

use super::consumer::QueueConsumer;
use crate::error::{QueueError, QueueResult};

/// Runs several [`QueueConsumer`]s, each with its own prefetch of one.
///
/// Consumers share nothing but the shutdown signal, so a slow job only
/// occupies its own consumer.
pub struct ConsumerPool {
    consumers: JoinSet<QueueResult<()>>,
    shutdown: watch::Receiver<bool>,
}

impl ConsumerPool {
    /// Create an empty pool stopped by `shutdown`.
    #[must_use]
    pub fn new(shutdown: watch::Receiver<bool>) -> Self {
        Self {
            consumers: JoinSet::new(),
            shutdown,
        }
    }

    /// Start `consumer` on the runtime.
    pub fn spawn(&mut self, consumer: QueueConsumer) {
        info!(consumer = consumer.name(), "Spawning queue consumer");
        self.consumers.spawn(consumer.run(self.shutdown.clone()));
    }

    /// Number of consumers still running.
    #[must_use]
    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    /// Whether no consumer is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    /// Wait for every consumer to stop.
    ///
    /// Returns the first error as soon as one consumer fails; the remaining
    /// consumers are aborted when the pool is dropped.
    pub async fn join(&mut self) -> QueueResult<()> {
        while let Some(joined) = self.consumers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "Queue consumer failed");
                    return Err(e);
                }
                Err(e) => {
                    error!(error = %e, "Queue consumer task panicked");
                    return Err(QueueError::Closed);
                }
            }
        }
        Ok(())
    }
}
