//! Behaviour every `MemoryStore` backend must share. Each backend's test
//! module runs these against its own store.

use sentient_core::error::MemoryError;
use sentient_core::memory::{MemoryStore, SeqRange};
use sentient_core::message::{MessageDraft, Role};
use sentient_core::session::{FailureKind, SessionId, SessionStatus};
use sentient_core::tool::{ToolCall, ToolResult};
use serde_json::json;

pub async fn create_commits_goal_at_zero(store: &dyn MemoryStore) {
    let session = store.create_session("list files in current directory").await.unwrap();
    assert_eq!(session.status, SessionStatus::Active);
    assert_eq!(session.messages.len(), 1);
    assert_eq!(session.messages[0].seq, 0);
    assert_eq!(session.messages[0].role, Role::User);
    assert_eq!(session.messages[0].content, "list files in current directory");

    let loaded = store.load_session(&session.id).await.unwrap();
    assert_eq!(loaded.goal, session.goal);
    assert_eq!(loaded.messages.len(), 1);
    assert_eq!(loaded.next_seq(), 1);
}

pub async fn appends_are_contiguous_and_round_trip(store: &dyn MemoryStore) {
    let session = store.create_session("goal").await.unwrap();

    let call = ToolCall {
        id: "call_1".into(),
        name: "shell".into(),
        arguments: json!({"command": "ls"}).as_object().cloned().unwrap(),
        origin_seq: 1,
    };
    let result = ToolResult {
        call_id: "call_1".into(),
        tool_name: "shell".into(),
        success: true,
        output: json!({"exit_code": 0, "stdout": "a.txt\n", "stderr": "", "truncated": false}),
        error: None,
        duration_ms: 3,
    };

    let range = store
        .append_messages(
            &session.id,
            1,
            vec![
                MessageDraft::model_with_calls("", vec![call.clone()]),
                MessageDraft::tool_result(result.clone()),
            ],
        )
        .await
        .unwrap();
    assert_eq!(range, SeqRange::new(1, 3));

    let range = store
        .append_messages(&session.id, 3, vec![MessageDraft::model("Found a.txt")])
        .await
        .unwrap();
    assert_eq!(range, SeqRange::new(3, 4));

    let loaded = store.load_session(&session.id).await.unwrap();
    let seqs: Vec<u64> = loaded.messages.iter().map(|m| m.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3]);
    assert!(loaded.verify_contiguous().is_ok());
    assert_eq!(loaded.messages[1].tool_calls(), &[call]);
    assert_eq!(loaded.messages[2].tool_result(), Some(&result));
    assert_eq!(loaded.messages[2].role, Role::Tool);
    assert_eq!(loaded.final_answer(), Some("Found a.txt"));
}

pub async fn stale_expectation_conflicts(store: &dyn MemoryStore) {
    let session = store.create_session("goal").await.unwrap();
    store
        .append_messages(&session.id, 1, vec![MessageDraft::model("one")])
        .await
        .unwrap();

    // Behind the store
    let err = store
        .append_messages(&session.id, 1, vec![MessageDraft::model("late")])
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::SequenceConflict { expected: 1, .. }), "{err}");

    // Ahead of the store
    let err = store
        .append_messages(&session.id, 5, vec![MessageDraft::model("early")])
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::SequenceConflict { expected: 5, .. }), "{err}");

    // Nothing from the rejected appends landed
    let loaded = store.load_session(&session.id).await.unwrap();
    assert_eq!(loaded.messages.len(), 2);
    assert_eq!(loaded.messages[1].content, "one");
}

pub async fn concurrent_appends_have_one_winner(store: &dyn MemoryStore) {
    let session = store.create_session("goal").await.unwrap();

    let (a, b) = tokio::join!(
        store.append_messages(&session.id, 1, vec![MessageDraft::model("a"), MessageDraft::user("a2")]),
        store.append_messages(&session.id, 1, vec![MessageDraft::model("b")]),
    );

    let wins = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(wins, 1, "exactly one append may win: {a:?} / {b:?}");
    for outcome in [&a, &b] {
        if let Err(err) = outcome {
            assert!(matches!(err, MemoryError::SequenceConflict { .. }), "{err}");
        }
    }

    let loaded = store.load_session(&session.id).await.unwrap();
    assert!(loaded.verify_contiguous().is_ok());
    let expected_len = if a.is_ok() { 3 } else { 2 };
    assert_eq!(loaded.messages.len(), expected_len);
}

pub async fn missing_session_is_not_found(store: &dyn MemoryStore) {
    let ghost = SessionId::from("no-such-session");

    let err = store.load_session(&ghost).await.unwrap_err();
    assert!(matches!(err, MemoryError::NotFound(_)), "{err}");

    let err = store
        .append_messages(&ghost, 0, vec![MessageDraft::user("hi")])
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::NotFound(_)), "{err}");

    let err = store
        .update_status(&ghost, &SessionStatus::Completed)
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::NotFound(_)), "{err}");
}

pub async fn status_and_reason_persist(store: &dyn MemoryStore) {
    let session = store.create_session("goal").await.unwrap();
    let failed = SessionStatus::failed(FailureKind::TurnLimitExceeded, "reached 25 turns");
    store.update_status(&session.id, &failed).await.unwrap();

    let loaded = store.load_session(&session.id).await.unwrap();
    assert_eq!(loaded.status, failed);

    store.update_status(&session.id, &SessionStatus::Active).await.unwrap();
    let loaded = store.load_session(&session.id).await.unwrap();
    assert_eq!(loaded.status, SessionStatus::Active);
}

pub async fn list_and_delete(store: &dyn MemoryStore) {
    let first = store.create_session("first").await.unwrap();
    let second = store.create_session("second").await.unwrap();
    store
        .append_messages(&first.id, 1, vec![MessageDraft::model("bump")])
        .await
        .unwrap();

    let listed = store.list_sessions(10).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, first.id, "most recently updated first");
    assert_eq!(listed[0].message_count, 2);
    assert_eq!(listed[1].id, second.id);

    assert_eq!(store.list_sessions(1).await.unwrap().len(), 1);

    assert!(store.delete_session(&first.id).await.unwrap());
    assert!(!store.delete_session(&first.id).await.unwrap());
    assert!(matches!(
        store.load_session(&first.id).await,
        Err(MemoryError::NotFound(_))
    ));
    assert_eq!(store.list_sessions(10).await.unwrap().len(), 1);
}

pub async fn empty_append_only_checks_position(store: &dyn MemoryStore) {
    let session = store.create_session("goal").await.unwrap();
    let range = store.append_messages(&session.id, 1, vec![]).await.unwrap();
    assert!(range.is_empty());
    assert!(store.append_messages(&session.id, 4, vec![]).await.is_err());
}

/// Run the whole suite. Each case creates its own sessions.
pub async fn run_all(store: &dyn MemoryStore) {
    create_commits_goal_at_zero(store).await;
    appends_are_contiguous_and_round_trip(store).await;
    stale_expectation_conflicts(store).await;
    concurrent_appends_have_one_winner(store).await;
    missing_session_is_not_found(store).await;
    status_and_reason_persist(store).await;
    empty_append_only_checks_position(store).await;
}
