//! Redelivery cap and dead letter entries.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

/// Decides whether a transiently failed delivery goes back on the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeliveryPolicy {
    /// Maximum number of times one message may be redelivered.
    pub max_redeliveries: u32,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            max_redeliveries: 5,
        }
    }
}

impl RedeliveryPolicy {
    #[must_use]
    pub const fn new(max_redeliveries: u32) -> Self {
        Self { max_redeliveries }
    }

    /// Check if a delivery that has already been redelivered `redeliveries`
    /// times may be requeued once more.
    #[must_use]
    pub const fn should_requeue(&self, redeliveries: u32) -> bool {
        redeliveries < self.max_redeliveries
    }

    /// Check if a delivery has been redelivered past the cap. Only crash
    /// recovery can get a message there.
    #[must_use]
    pub const fn is_exhausted(&self, redeliveries: u32) -> bool {
        redeliveries > self.max_redeliveries
    }
}

/// Message parked in the dead letter sink after exhausting its redeliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    /// Original queued body.
    pub body: String,
    /// Number of redeliveries made.
    pub redeliveries: u32,
    /// Last failure reason.
    pub last_error: String,
    /// Timestamp of last failure.
    pub failed_at: chrono::DateTime<chrono::Utc>,
}

impl DeadLetterEntry {
    /// Create a new dead letter entry.
    pub fn new(body: impl Into<String>, redeliveries: u32, error: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            redeliveries,
            last_error: error.into(),
            failed_at: chrono::Utc::now(),
        }
    }
}
