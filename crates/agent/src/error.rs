//! Control-plane errors of the agent loop.
//!
//! Tool-side problems never show up here: they are folded into
//! `ToolResult`s and reported to the model. What remains either stops the
//! run before it starts ([`SessionLoadError`]) or ends it with a durable
//! failure reason ([`AgentError`]).

use sentient_core::error::MemoryError;
use sentient_core::session::{FailureKind, SessionStatus};
use thiserror::Error;

/// The session could not be picked up. Nothing was resumed.
#[derive(Debug, Clone, Error)]
pub enum SessionLoadError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Store unreachable: {0}")]
    Unavailable(String),

    #[error("Stored session is corrupt: {0}")]
    Corrupt(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("No session to continue")]
    NothingToContinue,
}

impl From<MemoryError> for SessionLoadError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::NotFound(id) => Self::NotFound(id),
            MemoryError::Unavailable(msg) => Self::Unavailable(msg),
            MemoryError::Corrupt(msg) => Self::Corrupt(msg),
            other => Self::Store(other.to_string()),
        }
    }
}

/// Why a run ended in `failed`.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    /// Model or store unreachable after the retry budget.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Model output unusable after {attempts} attempts: {detail}")]
    MalformedModelOutput { attempts: u32, detail: String },

    /// Another writer advanced the session.
    #[error("{0}")]
    SequenceConflict(String),

    #[error("Turn limit of {0} reached")]
    TurnLimitExceeded(u32),

    #[error("Run was cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Transport(_) => FailureKind::Transport,
            Self::MalformedModelOutput { .. } => FailureKind::MalformedModelOutput,
            Self::SequenceConflict(_) => FailureKind::SequenceConflict,
            Self::TurnLimitExceeded(_) => FailureKind::TurnLimitExceeded,
            Self::Cancelled => FailureKind::Cancelled,
            Self::Internal(_) => FailureKind::Internal,
        }
    }

    /// The durable status recorded for this failure.
    pub fn to_status(&self) -> SessionStatus {
        SessionStatus::failed(self.failure_kind(), self.to_string())
    }

    /// Classify a store error that ended an append.
    pub fn from_store(err: MemoryError) -> Self {
        match err {
            MemoryError::SequenceConflict { .. } => Self::SequenceConflict(err.to_string()),
            MemoryError::Unavailable(_) => Self::Transport(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}
