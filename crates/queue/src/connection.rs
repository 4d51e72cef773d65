//! Redis client construction.

use fred::clients::{Client, SubscriberClient};
use fred::error::Error as RedisError;
use fred::interfaces::ClientLike;
use fred::types::config::Config as RedisConfig;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::QueueResult;

/// Background task driving one Redis connection.
///
/// It finishes when the client quits or when the connection is lost; no
/// reconnect policy is installed, so an early exit means the broker is gone.
pub type ConnectionTask = JoinHandle<Result<(), RedisError>>;

/// Create and connect a command client.
pub async fn connect_client(redis_url: &str) -> QueueResult<(Client, ConnectionTask)> {
    let config = RedisConfig::from_url(redis_url)?;
    let client = Client::new(config, None, None, None);
    let task = client.init().await?;
    debug!("Redis client connected");
    Ok((client, task))
}

/// Create and connect a client dedicated to Pub/Sub subscriptions.
pub async fn connect_subscriber(
    redis_url: &str,
) -> QueueResult<(SubscriberClient, ConnectionTask)> {
    let config = RedisConfig::from_url(redis_url)?;
    let subscriber = SubscriberClient::new(config, None, None, None);
    let task = subscriber.init().await?;
    debug!("Redis subscriber connected");
    Ok((subscriber, task))
}
