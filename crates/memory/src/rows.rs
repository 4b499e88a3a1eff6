//! Shared helpers for the SQL backends: column encoding, row decoding and
//! sqlx error classification.

use chrono::{DateTime, SecondsFormat, Utc};
use sentient_core::error::MemoryError;
use sentient_core::message::{Message, MessagePayload, Role};
use sentient_core::session::{SessionId, SessionStatus};

/// Fixed-width RFC 3339 so text timestamps sort correctly.
pub(crate) fn encode_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_time(column: &str, raw: &str) -> Result<DateTime<Utc>, MemoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MemoryError::Corrupt(format!("{column} '{raw}': {e}")))
}

/// Status columns: (status, failure_kind, failure_detail).
pub(crate) fn encode_status(status: &SessionStatus) -> (&'static str, Option<&'static str>, Option<String>) {
    match status.failure() {
        Some(reason) => (
            status.as_str(),
            Some(reason.kind.as_str()),
            Some(reason.detail.clone()),
        ),
        None => (status.as_str(), None, None),
    }
}

pub(crate) fn decode_status(
    id: &str,
    status: &str,
    failure_kind: Option<&str>,
    failure_detail: Option<&str>,
) -> Result<SessionStatus, MemoryError> {
    SessionStatus::from_parts(status, failure_kind, failure_detail)
        .map_err(|e| MemoryError::Corrupt(format!("session {id}: {e}")))
}

pub(crate) fn encode_payload(payload: &Option<MessagePayload>) -> Result<Option<String>, MemoryError> {
    payload
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| MemoryError::QueryFailed(format!("payload serialization: {e}")))
}

/// A message row with its columns already read out.
pub(crate) struct MessageRow {
    pub seq: i64,
    pub role: String,
    pub content: String,
    pub payload: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MessageRow {
    pub fn decode(self, session_id: &str) -> Result<Message, MemoryError> {
        let seq = u64::try_from(self.seq).map_err(|_| {
            MemoryError::Corrupt(format!("session {session_id}: negative sequence number {}", self.seq))
        })?;
        let role: Role = self
            .role
            .parse()
            .map_err(|e| MemoryError::Corrupt(format!("session {session_id} seq {seq}: {e}")))?;
        let payload = self
            .payload
            .as_deref()
            .map(serde_json::from_str::<MessagePayload>)
            .transpose()
            .map_err(|e| {
                MemoryError::Corrupt(format!("session {session_id} seq {seq}: unreadable payload: {e}"))
            })?;

        Ok(Message {
            seq,
            role,
            content: self.content,
            payload,
            created_at: self.created_at,
        })
    }
}

/// Classify a driver error. Connection-level trouble is `Unavailable` so
/// callers can retry it; constraint violations are handled by the caller.
pub(crate) fn map_sqlx_error(context: &str, err: sqlx::Error) -> MemoryError {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => MemoryError::Unavailable(format!("{context}: {err}")),
        sqlx::Error::Database(db) if is_busy(db.as_ref()) => {
            MemoryError::Unavailable(format!("{context}: {err}"))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            MemoryError::Corrupt(format!("{context}: {err}"))
        }
        _ => MemoryError::QueryFailed(format!("{context}: {err}")),
    }
}

/// SQLite's "database is locked" and Postgres' connection-exception class.
fn is_busy(db: &dyn sqlx::error::DatabaseError) -> bool {
    match db.code() {
        Some(code) => matches!(code.as_ref(), "5" | "6" | "517") || code.starts_with("08"),
        None => false,
    }
}

/// What a failed first insert of an append means.
pub(crate) enum InsertFailure {
    Conflict,
    MissingSession,
    Other(sqlx::Error),
}

pub(crate) fn classify_insert_error(err: sqlx::Error) -> InsertFailure {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return InsertFailure::Conflict;
        }
        if db.is_foreign_key_violation() {
            return InsertFailure::MissingSession;
        }
    }
    InsertFailure::Other(err)
}

pub(crate) fn not_found(id: &SessionId) -> MemoryError {
    MemoryError::NotFound(id.to_string())
}

pub(crate) fn conflict(id: &SessionId, expected: u64, actual: Option<u64>) -> MemoryError {
    MemoryError::SequenceConflict {
        session_id: id.to_string(),
        expected,
        actual,
    }
}
