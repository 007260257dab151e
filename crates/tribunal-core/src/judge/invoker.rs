use super::batch::JudgeBatch;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lifecycle states reported by the batch API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Validating,
    InProgress,
    Finalizing,
    Completed,
    Failed,
    Expired,
    Cancelling,
    Cancelled,
    #[serde(untagged)]
    Other(String),
}

impl BatchStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "validating" => Self::Validating,
            "in_progress" => Self::InProgress,
            "finalizing" => Self::Finalizing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "expired" => Self::Expired,
            "cancelling" => Self::Cancelling,
            "cancelled" => Self::Cancelled,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Validating => "validating",
            Self::InProgress => "in_progress",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Other(s) => s,
        }
    }

    /// No further polling can change the outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Expired | Self::Cancelled
        )
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JudgeOutput {
    pub lines: Vec<Value>,
    pub status: BatchStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JudgePoll {
    NotReady { status: BatchStatus },
    Ready(JudgeOutput),
}

/// External judge collaborator. Submission and retrieval are separate so the
/// dispatcher owns polling and timeouts.
#[async_trait]
pub trait JudgeInvoker: Send + Sync {
    /// Submits one batch and returns the judge-side batch id.
    async fn submit(&self, batch: &JudgeBatch) -> anyhow::Result<String>;

    async fn fetch(&self, remote_id: &str) -> anyhow::Result<JudgePoll>;

    fn provider_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_known_and_unknown() {
        assert_eq!(BatchStatus::parse("in_progress"), BatchStatus::InProgress);
        assert_eq!(BatchStatus::parse("weird").as_str(), "weird");
        assert!(BatchStatus::Expired.is_terminal());
        assert!(!BatchStatus::Finalizing.is_terminal());
        assert_eq!(
            serde_json::to_value(BatchStatus::Cancelling).unwrap(),
            "cancelling"
        );
    }
}
