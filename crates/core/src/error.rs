//! Error types for the Sentient domain.
//!
//! One `thiserror` enum per bounded context: providers, stores and tools.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether the failure is worth retrying (network trouble, rate limits,
    /// timeouts, server-side 5xx). Authentication and request errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited { .. } => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            Self::AuthenticationFailed(_)
            | Self::ModelNotFound(_)
            | Self::NotConfigured(_)
            | Self::InvalidResponse(_) => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error(
        "Sequence conflict on session {session_id}: expected next seq {expected}, store is at {}",
        describe_seq(.actual)
    )]
    SequenceConflict {
        session_id: String,
        expected: u64,
        actual: Option<u64>,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt session record: {0}")]
    Corrupt(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

fn describe_seq(actual: &Option<u64>) -> String {
    match actual {
        Some(seq) => seq.to_string(),
        None => "an unknown position".into(),
    }
}

impl MemoryError {
    /// Only an unreachable store is retried; everything else is a definite answer.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}
