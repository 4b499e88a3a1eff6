//! SQLite session store.
//!
//! Two tables (see `migrations/sqlite`):
//! - `sessions`: one row per session, status and failure reason included
//! - `messages`: the append-only log, primary key `(session_id, sequence_number)`
//!
//! An append opens a transaction whose first statement is a conditional
//! insert of the first draft: it only writes if the previous sequence number
//! exists, and the primary key rejects a duplicate. The ordering check and
//! the write are therefore a single statement, and two writers racing for
//! the same position cannot both win.

use async_trait::async_trait;
use chrono::Utc;
use sentient_core::error::MemoryError;
use sentient_core::memory::{MemoryStore, SeqRange, SessionSummary};
use sentient_core::message::{Message, MessageDraft};
use sentient_core::session::{Session, SessionId, SessionStatus};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::rows::{
    InsertFailure, MessageRow, classify_insert_error, conflict, decode_status, decode_time, encode_payload,
    encode_status, encode_time, map_sqlx_error, not_found,
};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations/sqlite");

/// A SQLite-backed [`MemoryStore`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `url` and run migrations.
    ///
    /// Accepts `sqlite://path/to/file.db` or `sqlite::memory:`.
    pub async fn connect(url: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| MemoryError::QueryFailed(format!("Invalid SQLite URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // An in-process database exists per connection, so keep exactly one
        let in_memory = url.contains(":memory:");
        if !in_memory {
            if let Some(parent) = options.get_filename().parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| MemoryError::Unavailable(format!("create {}: {e}", parent.display())))?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("open SQLite", e))?;

        let store = Self::from_pool(pool).await?;
        info!("SQLite session store opened at {url}");
        Ok(store)
    }

    /// Wrap an existing pool (running migrations on it).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| MemoryError::MigrationFailed(e.to_string()))?;
        debug!("SQLite migrations complete");
        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn next_seq(conn: &mut SqliteConnection, id: &SessionId) -> Result<Option<u64>, MemoryError> {
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE id = ?1")
            .bind(id.as_str())
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("session lookup", e))?;
        if exists == 0 {
            return Ok(None);
        }

        let next: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(sequence_number) + 1, 0) FROM messages WHERE session_id = ?1")
                .bind(id.as_str())
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| map_sqlx_error("next sequence lookup", e))?;
        Ok(Some(next.max(0) as u64))
    }

    /// Turn a rejected first insert into `NotFound` or `SequenceConflict`.
    async fn explain_rejection(&self, id: &SessionId, expected: u64) -> MemoryError {
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(_) => return conflict(id, expected, None),
        };
        match Self::next_seq(&mut *conn, id).await {
            Ok(None) => not_found(id),
            Ok(Some(actual)) => conflict(id, expected, Some(actual)),
            Err(_) => conflict(id, expected, None),
        }
    }

    async fn insert_message(
        conn: &mut SqliteConnection,
        id: &SessionId,
        seq: u64,
        draft: &MessageDraft,
        conditional: bool,
    ) -> Result<u64, sqlx::Error> {
        let sql = if conditional {
            r#"
            INSERT INTO messages (session_id, sequence_number, role, content, payload, created_at)
            SELECT ?1, ?2, ?3, ?4, ?5, ?6
            WHERE ?2 = 0
               OR EXISTS (SELECT 1 FROM messages WHERE session_id = ?1 AND sequence_number = ?2 - 1)
            "#
        } else {
            r#"
            INSERT INTO messages (session_id, sequence_number, role, content, payload, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#
        };

        let payload = encode_payload(&draft.payload).map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
        let result = sqlx::query(sql)
            .bind(id.as_str())
            .bind(seq as i64)
            .bind(draft.role.as_str())
            .bind(&draft.content)
            .bind(payload)
            .bind(encode_time(draft.created_at))
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    fn row_to_message(session_id: &str, row: &SqliteRow) -> Result<Message, MemoryError> {
        let column = |name: &str, e: sqlx::Error| MemoryError::Corrupt(format!("{name} column: {e}"));
        let created_at: String = row.try_get("created_at").map_err(|e| column("created_at", e))?;
        MessageRow {
            seq: row.try_get("sequence_number").map_err(|e| column("sequence_number", e))?,
            role: row.try_get("role").map_err(|e| column("role", e))?,
            content: row.try_get("content").map_err(|e| column("content", e))?,
            payload: row.try_get("payload").map_err(|e| column("payload", e))?,
            created_at: decode_time("created_at", &created_at)?,
        }
        .decode(session_id)
    }

    /// Session columns shared by `load_session` and `list_sessions`.
    fn row_to_header(row: &SqliteRow) -> Result<SessionSummary, MemoryError> {
        let column = |name: &str, e: sqlx::Error| MemoryError::Corrupt(format!("{name} column: {e}"));
        let id: String = row.try_get("id").map_err(|e| column("id", e))?;
        let status: String = row.try_get("status").map_err(|e| column("status", e))?;
        let failure_kind: Option<String> = row.try_get("failure_kind").map_err(|e| column("failure_kind", e))?;
        let failure_detail: Option<String> =
            row.try_get("failure_detail").map_err(|e| column("failure_detail", e))?;
        let created_at: String = row.try_get("created_at").map_err(|e| column("created_at", e))?;
        let updated_at: String = row.try_get("updated_at").map_err(|e| column("updated_at", e))?;
        let message_count: i64 = row.try_get("message_count").unwrap_or(0);

        Ok(SessionSummary {
            status: decode_status(&id, &status, failure_kind.as_deref(), failure_detail.as_deref())?,
            goal: row.try_get("goal").map_err(|e| column("goal", e))?,
            message_count: message_count.max(0) as u64,
            created_at: decode_time("created_at", &created_at)?,
            updated_at: decode_time("updated_at", &updated_at)?,
            id: SessionId(id),
        })
    }
}

#[async_trait]
impl MemoryStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load_session(&self, id: &SessionId) -> Result<Session, MemoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin load", e))?;

        let header = sqlx::query(
            r#"
            SELECT id, goal, status, failure_kind, failure_detail, created_at, updated_at
            FROM sessions WHERE id = ?1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("load session", e))?
        .ok_or_else(|| not_found(id))?;
        let header = Self::row_to_header(&header)?;

        let rows = sqlx::query(
            r#"
            SELECT sequence_number, role, content, payload, created_at
            FROM messages WHERE session_id = ?1
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(id.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("load messages", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("end load", e))?;

        let messages = rows
            .iter()
            .map(|row| Self::row_to_message(id.as_str(), row))
            .collect::<Result<Vec<_>, _>>()?;

        let session = Session {
            id: header.id,
            goal: header.goal,
            status: header.status,
            messages,
            created_at: header.created_at,
            updated_at: header.updated_at,
        };
        session.verify_contiguous().map_err(MemoryError::Corrupt)?;
        debug!(session_id = %id, messages = session.messages.len(), "Loaded session");
        Ok(session)
    }

    async fn create_session(&self, goal: &str) -> Result<Session, MemoryError> {
        let id = SessionId::new();
        let now = Utc::now();
        let first = MessageDraft::user(goal);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin create", e))?;

        sqlx::query(
            r#"
            INSERT INTO sessions (id, goal, status, created_at, updated_at)
            VALUES (?1, ?2, 'active', ?3, ?3)
            "#,
        )
        .bind(id.as_str())
        .bind(goal)
        .bind(encode_time(now))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert session", e))?;

        Self::insert_message(&mut *tx, &id, 0, &first, false)
            .await
            .map_err(|e| map_sqlx_error("insert goal", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit create", e))?;
        info!(session_id = %id, "Created session");

        Ok(Session {
            id,
            goal: goal.to_string(),
            status: SessionStatus::Active,
            messages: vec![first.commit(0)],
            created_at: now,
            updated_at: now,
        })
    }

    async fn append_messages(
        &self,
        id: &SessionId,
        expected_next_seq: u64,
        drafts: Vec<MessageDraft>,
    ) -> Result<SeqRange, MemoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin append", e))?;

        if drafts.is_empty() {
            return match Self::next_seq(&mut *tx, id).await? {
                None => Err(not_found(id)),
                Some(actual) if actual == expected_next_seq => {
                    Ok(SeqRange::new(expected_next_seq, expected_next_seq))
                }
                Some(actual) => Err(conflict(id, expected_next_seq, Some(actual))),
            };
        }

        for (offset, draft) in drafts.iter().enumerate() {
            let seq = expected_next_seq + offset as u64;
            let outcome = Self::insert_message(&mut *tx, id, seq, draft, offset == 0).await;
            let failure = match outcome {
                Ok(0) => InsertFailure::Conflict,
                Ok(_) => continue,
                Err(e) => classify_insert_error(e),
            };

            let _ = tx.rollback().await;
            let err = match failure {
                InsertFailure::Conflict => self.explain_rejection(id, expected_next_seq).await,
                InsertFailure::MissingSession => not_found(id),
                InsertFailure::Other(e) => map_sqlx_error("insert message", e),
            };
            warn!(session_id = %id, error = %err, "Append rejected");
            return Err(err);
        }

        sqlx::query("UPDATE sessions SET updated_at = ?1 WHERE id = ?2")
            .bind(encode_time(Utc::now()))
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("touch session", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit append", e))?;

        let range = SeqRange::new(expected_next_seq, expected_next_seq + drafts.len() as u64);
        debug!(session_id = %id, start = range.start, end = range.end, "Appended messages");
        Ok(range)
    }

    async fn update_status(&self, id: &SessionId, status: &SessionStatus) -> Result<(), MemoryError> {
        let (status_text, failure_kind, failure_detail) = encode_status(status);
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET status = ?1, failure_kind = ?2, failure_detail = ?3, updated_at = ?4
            WHERE id = ?5
            "#,
        )
        .bind(status_text)
        .bind(failure_kind)
        .bind(failure_detail)
        .bind(encode_time(Utc::now()))
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update status", e))?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        debug!(session_id = %id, status = %status, "Updated session status");
        Ok(())
    }

    async fn list_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>, MemoryError> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.goal, s.status, s.failure_kind, s.failure_detail, s.created_at, s.updated_at,
                   (SELECT COUNT(*) FROM messages m WHERE m.session_id = s.id) AS message_count
            FROM sessions s
            ORDER BY s.updated_at DESC, s.created_at DESC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list sessions", e))?;

        rows.iter().map(Self::row_to_header).collect()
    }

    async fn delete_session(&self, id: &SessionId) -> Result<bool, MemoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin delete", e))?;

        sqlx::query("DELETE FROM messages WHERE session_id = ?1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete messages", e))?;
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete session", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit delete", e))?;
        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(session_id = %id, "Deleted session");
        }
        Ok(deleted)
    }
}
