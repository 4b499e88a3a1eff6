//! In-memory store: useful for testing and throwaway runs.

use async_trait::async_trait;
use chrono::Utc;
use sentient_core::error::MemoryError;
use sentient_core::memory::{MemoryStore, SeqRange, SessionSummary};
use sentient_core::message::MessageDraft;
use sentient_core::session::{Session, SessionId, SessionStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A store that keeps sessions in a map behind a `RwLock`.
///
/// The write lock is held for the whole of an append, so the sequence
/// check and the insert are one atomic step.
pub struct InMemoryStore {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn load_session(&self, id: &SessionId) -> Result<Session, MemoryError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))
    }

    async fn create_session(&self, goal: &str) -> Result<Session, MemoryError> {
        let now = Utc::now();
        let session = Session {
            id: SessionId::new(),
            goal: goal.to_string(),
            status: SessionStatus::Active,
            messages: vec![MessageDraft::user(goal).commit(0)],
            created_at: now,
            updated_at: now,
        };
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn append_messages(
        &self,
        id: &SessionId,
        expected_next_seq: u64,
        drafts: Vec<MessageDraft>,
    ) -> Result<SeqRange, MemoryError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))?;

        let actual = session.next_seq();
        if actual != expected_next_seq {
            return Err(MemoryError::SequenceConflict {
                session_id: id.to_string(),
                expected: expected_next_seq,
                actual: Some(actual),
            });
        }

        let start = actual;
        for (offset, draft) in drafts.into_iter().enumerate() {
            session.messages.push(draft.commit(start + offset as u64));
        }
        if session.next_seq() > start {
            session.updated_at = Utc::now();
        }
        Ok(SeqRange::new(start, session.next_seq()))
    }

    async fn update_status(&self, id: &SessionId, status: &SessionStatus) -> Result<(), MemoryError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))?;
        session.status = status.clone();
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn list_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>, MemoryError> {
        let sessions = self.sessions.read().await;
        let mut summaries: Vec<SessionSummary> = sessions.values().map(SessionSummary::from).collect();
        summaries.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        summaries.truncate(limit);
        Ok(summaries)
    }

    async fn delete_session(&self, id: &SessionId) -> Result<bool, MemoryError> {
        Ok(self.sessions.write().await.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract;

    #[tokio::test]
    async fn shared_contract() {
        contract::run_all(&InMemoryStore::new()).await;
    }

    #[tokio::test]
    async fn list_and_delete() {
        contract::list_and_delete(&InMemoryStore::new()).await;
    }

    #[tokio::test]
    async fn backend_name() {
        assert_eq!(InMemoryStore::new().name(), "in_memory");
    }
}
