//! Session domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{Message, Role};

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a session ended in `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Model or store unreachable after all retries, or a permanent provider error
    Transport,
    MalformedModelOutput,
    /// Another writer advanced the session underneath this run
    SequenceConflict,
    TurnLimitExceeded,
    Cancelled,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transport => "transport",
            FailureKind::MalformedModelOutput => "malformed_model_output",
            FailureKind::SequenceConflict => "sequence_conflict",
            FailureKind::TurnLimitExceeded => "turn_limit_exceeded",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FailureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transport" => Ok(FailureKind::Transport),
            "malformed_model_output" => Ok(FailureKind::MalformedModelOutput),
            "sequence_conflict" => Ok(FailureKind::SequenceConflict),
            "turn_limit_exceeded" => Ok(FailureKind::TurnLimitExceeded),
            "cancelled" => Ok(FailureKind::Cancelled),
            "internal" => Ok(FailureKind::Internal),
            other => Err(format!("unknown failure kind '{other}'")),
        }
    }
}

/// A durable explanation attached to a failed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub detail: String,
}

impl FailureReason {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Failed { reason: FailureReason },
}

impl SessionStatus {
    pub fn failed(kind: FailureKind, detail: impl Into<String>) -> Self {
        SessionStatus::Failed {
            reason: FailureReason::new(kind, detail),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Active)
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            SessionStatus::Failed { reason } => Some(reason),
            _ => None,
        }
    }

    /// Rebuild a status from its stored columns.
    pub fn from_parts(
        status: &str,
        failure_kind: Option<&str>,
        failure_detail: Option<&str>,
    ) -> Result<Self, String> {
        match status {
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => {
                let kind = failure_kind
                    .ok_or_else(|| "failed session has no failure kind".to_string())?
                    .parse()?;
                Ok(SessionStatus::Failed {
                    reason: FailureReason::new(kind, failure_detail.unwrap_or_default()),
                })
            }
            other => Err(format!("unknown session status '{other}'")),
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Failed { reason } => write!(f, "failed ({reason})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// One task: a goal plus the ordered messages exchanged while pursuing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,

    /// The task goal, also committed as the `user` message at seq 0
    pub goal: String,

    pub status: SessionStatus,

    /// Committed messages, ordered by sequence number
    pub messages: Vec<Message>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// The sequence number the next append must carry.
    pub fn next_seq(&self) -> u64 {
        self.messages.len() as u64
    }

    /// Check that sequence numbers run 0, 1, 2, ... without gaps.
    pub fn verify_contiguous(&self) -> Result<(), String> {
        for (index, message) in self.messages.iter().enumerate() {
            if message.seq != index as u64 {
                return Err(format!(
                    "session {} has message seq {} at position {index}",
                    self.id, message.seq
                ));
            }
        }
        Ok(())
    }

    /// Model turns taken since the latest user prompt (the goal or a
    /// follow-up). Corrective prompts do not reset the count.
    pub fn model_turns(&self) -> u32 {
        self.messages
            .iter()
            .rev()
            .take_while(|m| !(m.role == Role::User && m.correction_attempt().is_none()))
            .filter(|m| m.role == Role::Model)
            .count() as u32
    }

    /// How many malformed responses in a row the session currently ends with.
    pub fn trailing_corrections(&self) -> u32 {
        self.messages
            .last()
            .and_then(Message::correction_attempt)
            .unwrap_or(0)
    }

    /// The last model message, if the session ended on one.
    pub fn final_answer(&self) -> Option<&str> {
        match self.messages.last() {
            Some(m) if m.role == Role::Model && m.payload.is_none() => Some(&m.content),
            _ => None,
        }
    }
}
