//! Queue consumers.

mod consumer;
mod pool;

pub use consumer::{ConsumerSettings, Disposition, QueueConsumer};
pub use pool::ConsumerPool;
