//! Domain event system: progress of a run, decoupled from whoever renders it.
//!
//! The orchestrator publishes events as it moves through a session. The CLI
//! subscribes to print progress; tests subscribe to assert on ordering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::session::SessionStatus;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A run picked up a session, fresh or resumed
    SessionStarted {
        session_id: String,
        resumed: bool,
        next_seq: u64,
        timestamp: DateTime<Utc>,
    },

    /// The model is about to be asked for turn `turn`
    TurnStarted {
        session_id: String,
        turn: u32,
        timestamp: DateTime<Utc>,
    },

    /// The model answered
    ModelResponded {
        session_id: String,
        model: String,
        tool_calls: usize,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        session_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Drafts reached durable storage
    MessagesCommitted {
        session_id: String,
        first_seq: u64,
        count: u64,
        timestamp: DateTime<Utc>,
    },

    /// A transient failure will be retried after `delay_ms`
    RetryScheduled {
        session_id: String,
        operation: String,
        attempt: u32,
        delay_ms: u64,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// The run ended
    SessionTerminated {
        session_id: String,
        status: SessionStatus,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
