//! The agent loop for Sentient.
//!
//! A run follows the **model → tools → persist** cycle:
//!
//! 1. **Load or create** the session (the goal is message 0)
//! 2. **Ask the model**, with the whole committed history as the prompt
//! 3. **If tool calls**: run them through the registry, bounded and in parallel
//! 4. **Commit** the turn as one append, then go back to step 2
//! 5. **If a final answer**: commit it and mark the session completed
//!
//! Failures of the control plane (model or store unreachable, a competing
//! writer, the turn limit, cancellation) end the session `failed` with a
//! durable reason. Tool failures are just results the model gets to see.

pub mod context;
pub mod error;
pub mod orchestrator;
pub mod parse;
pub mod retry;

pub use context::TaskContext;
pub use error::{AgentError, SessionLoadError};
pub use orchestrator::{AfterCommit, LoopState, Orchestrator, RunOutcome, SessionTarget};
pub use parse::{ModelOutput, parse_model_output};
pub use retry::{RetryError, RetryPolicy};
