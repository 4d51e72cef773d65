//! Job queue plumbing for jobcast.
//!
//! - **Backend**: reliable work queue on Redis lists, plus an in-memory twin
//! - **Workers**: consumers that decode, execute and settle one job at a time
//! - **Publisher**: ordered, non-blocking publication of job outcomes
//! - **Pub/Sub**: the Redis notification channel and its local fan-in
//! - **Retry**: redelivery cap and dead letter entries

pub mod backend;
pub mod connection;
pub mod error;
pub mod executor;
pub mod jobs;
pub mod publisher;
pub mod pubsub;
pub mod retry;
pub mod workers;

pub use backend::{Delivery, MemoryWorkQueue, RedisWorkQueue, Settlement, WorkQueue};
pub use connection::{ConnectionTask, connect_client, connect_subscriber};
pub use error::{QueueError, QueueResult};
pub use executor::{ExecutionError, JobExecutor};
pub use jobs::*;
pub use publisher::{NotificationSink, ResultPublisher};
pub use pubsub::RedisPubSub;
pub use retry::{DeadLetterEntry, RedeliveryPolicy};
pub use workers::*;
