//! Job outcome published to live clients.

use serde::{Deserialize, Serialize};

/// Terminal status of an executed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    Failed,
}

/// Result of executing one job message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub task_id: String,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobOutcome {
    /// Outcome of a job that produced an artifact.
    #[must_use]
    pub fn completed(task_id: impl Into<String>, artifact_location: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: OutcomeStatus::Completed,
            artifact_location: Some(artifact_location.into()),
            error_message: None,
        }
    }

    /// Outcome of a job whose executor reported an error.
    #[must_use]
    pub fn failed(task_id: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: OutcomeStatus::Failed,
            artifact_location: None,
            error_message: Some(error_message.into()),
        }
    }
}
