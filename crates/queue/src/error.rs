//! Queue error types.

use fred::error::Error as RedisError;
use jobcast_common::AppError;
use thiserror::Error;

/// Result type for queue and pub/sub operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors raised by the broker-facing parts of the queue crate.
///
/// Every variant except [`QueueError::Serialization`] means the broker
/// connection can no longer be trusted.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Redis command or connection failure.
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    /// A payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A settlement named a delivery this consumer does not hold.
    #[error("Delivery {0:?} is not in flight for this consumer")]
    UnknownDelivery(String),

    /// The queue backend has been shut down.
    #[error("Queue closed")]
    Closed,
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Redis(e) => Self::Redis(e.to_string()),
            other => Self::Queue(other.to_string()),
        }
    }
}
