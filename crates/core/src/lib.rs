//! # Sentient Core
//!
//! Domain types, traits, and error definitions for the Sentient agent.
//! Every other crate depends inward on this one: sessions and messages,
//! the tool registry, the memory store contract, the provider contract,
//! prompt assembly and the event bus all live here.

pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod schema;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{MemoryError, ProviderError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use memory::{MemoryStore, SeqRange, SessionSummary};
pub use message::{Message, MessageDraft, MessagePayload, Role};
pub use prompt::{DefaultPromptAssembler, PromptAssembler};
pub use provider::{ChatMessage, ChatRole, Provider, ProviderRequest, ProviderResponse, RawToolCall, ToolDefinition};
pub use session::{FailureKind, FailureReason, Session, SessionId, SessionStatus};
pub use tool::{Tool, ToolCall, ToolErrorKind, ToolOutput, ToolRegistry, ToolRegistryBuilder, ToolResult};
