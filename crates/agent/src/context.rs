//! Per-run task context.
//!
//! Everything the loop knows about a run lives in one serializable value:
//! the session as committed so far, the counters derived from it and the
//! drafts of the turn in progress.

use serde::{Deserialize, Serialize};
use sentient_core::memory::SeqRange;
use sentient_core::message::MessageDraft;
use sentient_core::session::{Session, SessionId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    /// The session with every committed message, in order.
    pub session: Session,

    /// Model turns taken for the current prompt.
    pub turn: u32,

    /// Consecutive malformed responses so far.
    pub corrective_attempts: u32,

    /// Whether the session came from storage rather than a fresh goal.
    pub resumed: bool,

    /// Drafts of the current turn, not yet committed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending: Vec<MessageDraft>,

    /// Drafts that were dropped because no commit succeeded.
    #[serde(default)]
    pub uncommitted: usize,

    /// Tokens reported by the provider during this run.
    #[serde(default)]
    pub tokens_used: u64,
}

impl TaskContext {
    /// Build a context whose counters agree with the committed history, so
    /// a resumed run continues exactly where an uninterrupted one would be.
    pub fn from_session(session: Session, resumed: bool) -> Self {
        let mut ctx = Self {
            session,
            turn: 0,
            corrective_attempts: 0,
            resumed,
            pending: Vec::new(),
            uncommitted: 0,
            tokens_used: 0,
        };
        ctx.recount();
        ctx
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session.id
    }

    pub fn next_seq(&self) -> u64 {
        self.session.next_seq()
    }

    /// Record drafts the store accepted at `range`.
    pub fn apply_commit(&mut self, range: SeqRange, drafts: Vec<MessageDraft>) {
        debug_assert_eq!(range.start, self.next_seq());
        debug_assert_eq!(range.len(), drafts.len() as u64);
        for (offset, draft) in drafts.into_iter().enumerate() {
            self.session.messages.push(draft.commit(range.start + offset as u64));
        }
        self.recount();
    }

    /// Give up on the drafts of the current turn.
    pub fn abandon_pending(&mut self) {
        self.uncommitted += self.pending.len();
        self.pending.clear();
    }

    fn recount(&mut self) {
        self.turn = self.session.model_turns();
        self.corrective_attempts = self.session.trailing_corrections();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sentient_core::session::SessionStatus;

    fn fresh() -> Session {
        Session {
            id: SessionId::from("s1"),
            goal: "list files".into(),
            status: SessionStatus::Active,
            messages: vec![MessageDraft::user("list files").commit(0)],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn counters_follow_commits() {
        let mut ctx = TaskContext::from_session(fresh(), false);
        assert_eq!((ctx.turn, ctx.corrective_attempts), (0, 0));

        let drafts = vec![MessageDraft::rejected("", "empty"), MessageDraft::correction("again", 1)];
        ctx.apply_commit(SeqRange::new(1, 3), drafts);
        assert_eq!(ctx.next_seq(), 3);
        assert_eq!((ctx.turn, ctx.corrective_attempts), (1, 1));

        ctx.apply_commit(SeqRange::new(3, 4), vec![MessageDraft::model("done")]);
        assert_eq!((ctx.turn, ctx.corrective_attempts), (2, 0));
        assert_eq!(ctx.session.final_answer(), Some("done"));
    }

    #[test]
    fn resumed_context_matches_uninterrupted_one() {
        let mut live = TaskContext::from_session(fresh(), false);
        live.apply_commit(
            SeqRange::new(1, 3),
            vec![MessageDraft::rejected("?", "no marker"), MessageDraft::correction("again", 1)],
        );

        let resumed = TaskContext::from_session(live.session.clone(), true);
        assert_eq!(resumed.turn, live.turn);
        assert_eq!(resumed.corrective_attempts, live.corrective_attempts);
        assert_eq!(resumed.next_seq(), live.next_seq());
    }

    #[test]
    fn abandoned_drafts_are_counted() {
        let mut ctx = TaskContext::from_session(fresh(), false);
        ctx.pending = vec![MessageDraft::model("a"), MessageDraft::model("b")];
        ctx.abandon_pending();
        assert!(ctx.pending.is_empty());
        assert_eq!(ctx.uncommitted, 2);
        assert_eq!(ctx.next_seq(), 1);
    }

    #[test]
    fn context_serializes() {
        let ctx = TaskContext::from_session(fresh(), true);
        let json = serde_json::to_string(&ctx).unwrap();
        let back: TaskContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ctx);
    }
}
