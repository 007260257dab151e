use serde::Serialize;
use std::fmt::{Display, Formatter};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TribunalError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("judge unavailable for batch {batch_id}: {reason}")]
    JudgeUnavailable {
        batch_id: String,
        reason: UnavailableReason,
    },

    #[error("malformed judge output: {0}")]
    MalformedJudgeOutput(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TribunalError {
    pub fn invalid_input(detail: impl Into<String>) -> Self {
        Self::InvalidInput(detail.into())
    }

    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config(detail.into())
    }
}

/// Why a batch (or a single candidate inside it) produced no judge result.
///
/// Every variant is recoverable by a caller-level retry; none of them is
/// fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum UnavailableReason {
    /// The judge did not finish within the dispatch timeout.
    Timeout { after_ms: u64 },
    /// The judge reported a terminal or non-completed batch status.
    NotReady { status: String },
    /// Submission or retrieval failed at the transport layer.
    Transport(String),
    /// The judge answered, but the answer could not be mapped to this candidate.
    Malformed(String),
    /// Another evaluation owned this fingerprint and failed to produce a score.
    LeaderFailed,
}

impl Display for UnavailableReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UnavailableReason::Timeout { after_ms } => write!(f, "timed out after {}ms", after_ms),
            UnavailableReason::NotReady { status } => write!(f, "batch not ready (status={})", status),
            UnavailableReason::Transport(msg) => write!(f, "transport error: {}", msg),
            UnavailableReason::Malformed(msg) => write!(f, "malformed judge output: {}", msg),
            UnavailableReason::LeaderFailed => {
                write!(f, "concurrent evaluation of the same fingerprint failed")
            }
        }
    }
}
