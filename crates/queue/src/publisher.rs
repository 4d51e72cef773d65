//! Result publication.
//!
//! Outcomes are serialized on the caller's task and then handed to a single
//! background task that publishes them in order. Publishing never blocks the
//! consumer, and a failed publish is logged and dropped.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::QueueResult;
use crate::jobs::JobOutcome;

/// Transport that carries serialized outcomes to subscribers.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Publish `payload` on `channel`.
    async fn publish(&self, channel: &str, payload: String) -> QueueResult<()>;
}

/// Serializes job outcomes and publishes them on the notification channel.
#[derive(Clone)]
pub struct ResultPublisher {
    tx: mpsc::UnboundedSender<(String, String)>,
}

impl ResultPublisher {
    /// Start the publishing task for `channel`.
    ///
    /// The task ends once every clone of the returned publisher is dropped.
    pub fn spawn(
        sink: Arc<dyn NotificationSink>,
        channel: impl Into<String>,
    ) -> (Self, JoinHandle<()>) {
        let channel = channel.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, String)>();

        let handle = tokio::spawn(async move {
            while let Some((task_id, payload)) = rx.recv().await {
                match sink.publish(&channel, payload).await {
                    Ok(()) => debug!(%task_id, %channel, "Published job outcome"),
                    Err(e) => {
                        warn!(%task_id, %channel, error = %e, "Failed to publish job outcome");
                    }
                }
            }
            debug!(%channel, "Result publisher stopped");
        });

        (Self { tx }, handle)
    }

    /// Serialize `outcome` and queue it for publication.
    ///
    /// Only serialization can fail; transport failures are logged by the
    /// publishing task.
    pub fn publish(&self, outcome: &JobOutcome) -> Result<(), serde_json::Error> {
        let payload = serde_json::to_string(outcome)?;
        if self.tx.send((outcome.task_id.clone(), payload)).is_err() {
            warn!(task_id = %outcome.task_id, "Result publisher stopped, outcome dropped");
        }
        Ok(())
    }
}
