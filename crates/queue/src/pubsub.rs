//! Redis Pub/Sub for job outcome notifications.
//!
//! One client publishes outcomes, a dedicated subscriber client holds the
//! standing subscription and forwards every payload into a local broadcast
//! channel that the notification broadcaster consumes.

#![allow(missing_docs)]

use async_trait::async_trait;
use fred::clients::{Client, SubscriberClient};
use fred::interfaces::{ClientLike, EventInterface, PubsubInterface};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionTask, connect_client, connect_subscriber};
use crate::error::QueueResult;
use crate::publisher::NotificationSink;

/// Capacity of the local broadcast channel.
const LOCAL_CAPACITY: usize = 1000;

/// Redis Pub/Sub manager for the notification channel.
#[derive(Clone)]
pub struct RedisPubSub {
    publisher: Client,
    subscriber: SubscriberClient,
    channel: String,
    /// Local broadcast channel for payloads received from Redis.
    local_tx: broadcast::Sender<String>,
}

impl RedisPubSub {
    /// Connect the publisher and subscriber clients.
    ///
    /// Returns the connection tasks alongside so the caller can treat a lost
    /// connection as fatal.
    pub async fn new(
        redis_url: &str,
        channel: &str,
    ) -> QueueResult<(Self, Vec<ConnectionTask>)> {
        let (publisher, publisher_task) = connect_client(redis_url).await?;
        let (subscriber, subscriber_task) = connect_subscriber(redis_url).await?;

        let (local_tx, _) = broadcast::channel(LOCAL_CAPACITY);

        info!(%channel, "Redis Pub/Sub initialized");

        Ok((
            Self {
                publisher,
                subscriber,
                channel: channel.to_string(),
                local_tx,
            },
            vec![publisher_task, subscriber_task],
        ))
    }

    /// Subscribe to the notification channel and start forwarding payloads.
    ///
    /// The returned task ends when the subscriber's message stream closes.
    pub async fn start(&self) -> QueueResult<JoinHandle<()>> {
        // The receiver must exist before SUBSCRIBE so no early message is missed.
        let mut message_stream = self.subscriber.message_rx();
        self.subscriber.subscribe(self.channel.as_str()).await?;

        info!(channel = %self.channel, "Subscribed to notification channel");

        let local_tx = self.local_tx.clone();
        let channel = self.channel.clone();

        let handle = tokio::spawn(async move {
            loop {
                match message_stream.recv().await {
                    Ok(message) => {
                        if &*message.channel != channel.as_str() {
                            continue;
                        }
                        let Some(payload) = message.value.as_string() else {
                            warn!(%channel, "Ignoring non-text Pub/Sub payload");
                            continue;
                        };
                        debug!(%channel, "Received notification");
                        if local_tx.send(payload).is_err() {
                            debug!("No local subscribers for notification");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(%channel, skipped = n, "Pub/Sub message stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            info!(%channel, "Pub/Sub message stream ended");
        });

        Ok(handle)
    }

    /// Publish a payload to a channel.
    pub async fn publish(&self, channel: &str, payload: String) -> QueueResult<()> {
        let _: i64 = self.publisher.publish(channel, payload).await?;
        debug!(channel, "Published Pub/Sub message");
        Ok(())
    }

    /// Name of the notification channel.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Get a receiver for locally forwarded payloads.
    #[must_use]
    pub fn subscribe_local(&self) -> broadcast::Receiver<String> {
        self.local_tx.subscribe()
    }

    /// Unsubscribe and close both clients.
    pub async fn shutdown(&self) -> QueueResult<()> {
        self.subscriber.unsubscribe(self.channel.as_str()).await?;
        self.subscriber.quit().await?;
        self.publisher.quit().await?;
        info!("Redis Pub/Sub shutdown");
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for RedisPubSub {
    async fn publish(&self, channel: &str, payload: String) -> QueueResult<()> {
        Self::publish(self, channel, payload).await
    }
}
