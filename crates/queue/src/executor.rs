//! Job payload executor contract.

use async_trait::async_trait;

/// Error returned by an executor. It becomes the outcome's `error_message`.
pub type ExecutionError = Box<dyn std::error::Error + Send + Sync>;

/// Performs the long-running work behind a job message.
///
/// A consumer never calls `execute` again before the previous call returned.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Run the job for `task_id` and return the produced artifact's location.
    async fn execute(&self, task_id: &str) -> Result<String, ExecutionError>;
}
