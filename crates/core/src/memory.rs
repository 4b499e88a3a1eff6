//! Memory store trait: durable, append-only session history.
//!
//! A store keeps sessions and their messages. Appends are optimistic: the
//! caller states which sequence number it believes comes next, and the store
//! rejects the write if it does not. This keeps a single writer per session
//! honest without any locking on the caller's side.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::message::MessageDraft;
use crate::session::{Session, SessionId, SessionStatus};

/// A half-open range of committed sequence numbers, `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqRange {
    pub start: u64,
    pub end: u64,
}

impl SeqRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The last sequence number in the range.
    pub fn last(&self) -> Option<u64> {
        if self.is_empty() {
            None
        } else {
            Some(self.end - 1)
        }
    }
}

/// A listing row: a session without its messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub goal: String,
    pub status: SessionStatus,
    pub message_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            goal: session.goal.clone(),
            status: session.status.clone(),
            message_count: session.messages.len() as u64,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

/// The core MemoryStore trait.
///
/// Implementations: in-memory (for testing), SQLite, PostgreSQL.
///
/// Every implementation guarantees that committed sequence numbers of a
/// session are contiguous from 0 and that a committed message is never
/// rewritten.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "postgres", "in_memory").
    fn name(&self) -> &str;

    /// Load a session with all of its committed messages.
    async fn load_session(&self, id: &SessionId) -> Result<Session, MemoryError>;

    /// Create an `active` session and commit `goal` as the user message at seq 0.
    async fn create_session(&self, goal: &str) -> Result<Session, MemoryError>;

    /// Append `drafts` atomically, starting at `expected_next_seq`.
    ///
    /// Fails with [`MemoryError::SequenceConflict`] when the session's next
    /// sequence number is not `expected_next_seq`. Either every draft is
    /// committed or none is.
    async fn append_messages(
        &self,
        id: &SessionId,
        expected_next_seq: u64,
        drafts: Vec<MessageDraft>,
    ) -> Result<SeqRange, MemoryError>;

    /// Record a new status, including its failure reason.
    async fn update_status(&self, id: &SessionId, status: &SessionStatus) -> Result<(), MemoryError>;

    /// Most recently updated sessions first.
    async fn list_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>, MemoryError>;

    /// Remove a session and its messages. Returns false if it did not exist.
    async fn delete_session(&self, id: &SessionId) -> Result<bool, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_range_bounds() {
        let range = SeqRange::new(3, 6);
        assert_eq!(range.len(), 3);
        assert_eq!(range.last(), Some(5));
        assert!(!range.is_empty());

        let empty = SeqRange::new(4, 4);
        assert!(empty.is_empty());
        assert_eq!(empty.last(), None);
    }
}
