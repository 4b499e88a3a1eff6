//! Message domain types.
//!
//! A message is drafted in memory by the orchestrator ([`MessageDraft`]) and
//! only becomes a [`Message`] once the memory store has assigned it a
//! sequence number. Committed messages are immutable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool::{ToolCall, ToolResult};

/// The role of a message author within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The task goal, and corrective nudges from the orchestrator
    User,
    /// Anything the language model produced
    Model,
    /// A tool execution result
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "model" => Ok(Role::Model),
            "tool" => Ok(Role::Tool),
            other => Err(format!("unknown message role '{other}'")),
        }
    }
}

/// Structured data attached to a message besides its text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    /// The model asked for one or more tools to run
    ToolCalls { calls: Vec<ToolCall> },

    /// The outcome of a single tool call
    ToolResult { result: ToolResult },

    /// A corrective prompt injected after malformed model output
    Correction { attempt: u32 },

    /// Model output that could not be used
    Rejected { problem: String },
}

/// A committed message. Never rewritten once the store has accepted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Position within the session, contiguous from 0
    pub seq: u64,

    pub role: Role,

    /// The text content
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<MessagePayload>,

    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Tool calls carried by a model message, if any.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match &self.payload {
            Some(MessagePayload::ToolCalls { calls }) => calls,
            _ => &[],
        }
    }

    /// The tool result carried by a tool message, if any.
    pub fn tool_result(&self) -> Option<&ToolResult> {
        match &self.payload {
            Some(MessagePayload::ToolResult { result }) => Some(result),
            _ => None,
        }
    }

    /// The correction attempt number if this is a corrective prompt.
    pub fn correction_attempt(&self) -> Option<u32> {
        match &self.payload {
            Some(MessagePayload::Correction { attempt }) => Some(*attempt),
            _ => None,
        }
    }

    /// Whether this model message was rejected as malformed.
    pub fn is_rejected(&self) -> bool {
        matches!(self.payload, Some(MessagePayload::Rejected { .. }))
    }
}

/// A message that has not been committed yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDraft {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<MessagePayload>,
    pub created_at: DateTime<Utc>,
}

impl MessageDraft {
    fn new(role: Role, content: impl Into<String>, payload: Option<MessagePayload>) -> Self {
        Self {
            role,
            content: content.into(),
            payload,
            created_at: Utc::now(),
        }
    }

    /// Create a user message (the goal).
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, None)
    }

    /// Create a plain model message (a final answer).
    pub fn model(content: impl Into<String>) -> Self {
        Self::new(Role::Model, content, None)
    }

    /// Keep model output that could not be used, along with what was wrong.
    pub fn rejected(content: impl Into<String>, problem: impl Into<String>) -> Self {
        Self::new(
            Role::Model,
            content,
            Some(MessagePayload::Rejected {
                problem: problem.into(),
            }),
        )
    }

    /// Create a model message that requests tool calls.
    pub fn model_with_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self::new(Role::Model, content, Some(MessagePayload::ToolCalls { calls }))
    }

    /// Create a tool message. The content is the JSON rendering the model sees.
    pub fn tool_result(result: ToolResult) -> Self {
        let content = result.render();
        Self::new(Role::Tool, content, Some(MessagePayload::ToolResult { result }))
    }

    /// Create a corrective user message.
    pub fn correction(content: impl Into<String>, attempt: u32) -> Self {
        Self::new(Role::User, content, Some(MessagePayload::Correction { attempt }))
    }

    /// Turn the draft into a committed message at `seq`.
    pub fn commit(self, seq: u64) -> Message {
        Message {
            seq,
            role: self.role,
            content: self.content,
            payload: self.payload,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_from_storage_text() {
        assert_eq!("model".parse::<Role>().unwrap(), Role::Model);
        assert_eq!(Role::Tool.to_string(), "tool");
        assert!("assistant".parse::<Role>().is_err());
    }

    #[test]
    fn commit_keeps_content_and_assigns_seq() {
        let draft = MessageDraft::user("list files in current directory");
        let created = draft.created_at;
        let msg = draft.commit(0);
        assert_eq!(msg.seq, 0);
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "list files in current directory");
        assert_eq!(msg.created_at, created);
        assert!(msg.payload.is_none());
    }

    #[test]
    fn correction_payload_is_tagged() {
        let msg = MessageDraft::correction("please call a tool", 2).commit(4);
        assert_eq!(msg.correction_attempt(), Some(2));
        let json = serde_json::to_value(&msg.payload).unwrap();
        assert_eq!(json["type"], "correction");
        assert_eq!(json["attempt"], 2);
    }

    #[test]
    fn rejected_output_is_marked() {
        let msg = MessageDraft::rejected("", "the response was empty").commit(1);
        assert_eq!(msg.role, Role::Model);
        assert!(msg.is_rejected());
        assert!(!MessageDraft::model("done").commit(1).is_rejected());
    }

    #[test]
    fn plain_messages_have_no_tool_calls() {
        let msg = MessageDraft::model("done").commit(3);
        assert!(msg.tool_calls().is_empty());
        assert!(msg.tool_result().is_none());
    }
}
