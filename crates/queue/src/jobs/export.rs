//! Export job message.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Action requested by a job message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    /// Generate a data export file.
    GenerateExport,
}

impl JobAction {
    /// Wire name of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GenerateExport => "generate_export",
        }
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobAction {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generate_export" => Ok(Self::GenerateExport),
            other => Err(DecodeError::UnknownAction(other.to_string())),
        }
    }
}

/// Why a queued body could not become a [`JobMessage`].
///
/// Both variants are permanent: the same bytes will never decode on a later attempt.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed job message: {0}")]
    Malformed(String),

    #[error("unknown job action: {0}")]
    UnknownAction(String),
}

/// Job submitted by the HTTP layer and consumed by a queue worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobMessage {
    /// Task identifier, unique per submission.
    pub task_id: String,
    /// Requested action.
    pub action: JobAction,
}

/// Loosely typed shape used to tell a malformed body from an unknown action.
#[derive(Deserialize)]
struct RawJobMessage {
    task_id: String,
    action: String,
}

impl JobMessage {
    /// Create a new export job.
    #[must_use]
    pub fn generate_export(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            action: JobAction::GenerateExport,
        }
    }

    /// Decode a queued body.
    pub fn decode(body: &str) -> Result<Self, DecodeError> {
        let raw: RawJobMessage =
            serde_json::from_str(body).map_err(|e| DecodeError::Malformed(e.to_string()))?;

        if raw.task_id.trim().is_empty() {
            return Err(DecodeError::Malformed("empty task_id".to_string()));
        }

        let action = raw.action.parse()?;

        Ok(Self {
            task_id: raw.task_id,
            action,
        })
    }

    /// Encode for the queue.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_message() {
        let job = JobMessage::decode(r#"{"task_id":"task_1","action":"generate_export"}"#).unwrap();

        assert_eq!(job.task_id, "task_1");
        assert_eq!(job.action, JobAction::GenerateExport);
    }

    #[test]
    fn test_decode_without_action_is_malformed() {
        let err = JobMessage::decode(r#"{"foo":"bar"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_decode_not_json_is_malformed() {
        let err = JobMessage::decode("generate_export please").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_decode_empty_task_id_is_malformed() {
        let err = JobMessage::decode(r#"{"task_id":"  ","action":"generate_export"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_decode_unknown_action() {
        let err = JobMessage::decode(r#"{"task_id":"t","action":"generate_xlsx"}"#).unwrap_err();

        match err {
            DecodeError::UnknownAction(action) => assert_eq!(action, "generate_xlsx"),
            other => panic!("Expected UnknownAction, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_uses_wire_names() {
        let json = JobMessage::generate_export("task_9").encode().unwrap();

        assert!(json.contains("\"task_id\":\"task_9\""));
        assert!(json.contains("\"action\":\"generate_export\""));
    }
}
