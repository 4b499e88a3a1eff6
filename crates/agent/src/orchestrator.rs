//! The agent execution loop.
//!
//! A run moves through explicit states:
//!
//! ```text
//! init ─► AwaitingModel ─► DispatchingTools ─► Persisting ─► AwaitingModel
//!               │                                   │
//!               └──────────► Persisting ────────────┴──► Terminated
//! ```
//!
//! [`Orchestrator::init`] loads or creates the session; [`Orchestrator::step`]
//! performs one transition. Every turn is committed to the store as a single
//! append carrying the expected next sequence number, so two orchestrators
//! racing on one session cannot interleave writes.

use futures::StreamExt;
use futures::stream::FuturesOrdered;
use sentient_config::AgentConfig;
use sentient_core::error::{MemoryError, ProviderError};
use sentient_core::event::{DomainEvent, EventBus};
use sentient_core::memory::MemoryStore;
use sentient_core::message::MessageDraft;
use sentient_core::prompt::{DefaultPromptAssembler, PromptAssembler};
use sentient_core::provider::{Provider, ProviderRequest, ProviderResponse};
use sentient_core::session::{FailureKind, SessionId, SessionStatus};
use sentient_core::tool::{ToolCall, ToolRegistry, ToolResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::TaskContext;
use crate::error::{AgentError, SessionLoadError};
use crate::parse::{ModelOutput, correction_prompt, parse_model_output};
use crate::retry::{RetryError, RetryPolicy};

/// Where a run starts.
#[derive(Debug, Clone)]
pub enum SessionTarget {
    /// A new session for `goal`.
    New { goal: String },

    /// An existing session. A `follow_up` is committed as a new user
    /// prompt, which also reopens a completed session.
    Resume {
        session_id: SessionId,
        follow_up: Option<String>,
    },

    /// The most recently updated session.
    Latest { follow_up: Option<String> },
}

/// What happens once the pending drafts are committed.
#[derive(Debug, Clone)]
pub enum AfterCommit {
    Continue,
    Complete,
    Fail(AgentError),
}

#[derive(Debug, Clone)]
pub enum LoopState {
    AwaitingModel,
    DispatchingTools { calls: Vec<ToolCall> },
    Persisting { then: AfterCommit },
    Terminated(SessionStatus),
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Terminated(_))
    }
}

/// How a run ended.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub final_answer: Option<String>,
    /// Model turns taken for the current prompt.
    pub turns: u32,
    /// Messages durably stored for the session.
    pub committed_messages: u64,
    /// Drafts produced but never committed.
    pub uncommitted_drafts: usize,
    /// False when the terminal status could not be written.
    pub status_persisted: bool,
    pub resumed: bool,
    pub tokens_used: u64,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    fn from_context(ctx: &TaskContext, status: SessionStatus, status_persisted: bool) -> Self {
        let final_answer = match status {
            SessionStatus::Completed => ctx.session.final_answer().map(str::to_string),
            _ => None,
        };
        Self {
            session_id: ctx.session.id.clone(),
            status,
            final_answer,
            turns: ctx.turn,
            committed_messages: ctx.next_seq(),
            uncommitted_drafts: ctx.uncommitted,
            status_persisted,
            resumed: ctx.resumed,
            tokens_used: ctx.tokens_used,
        }
    }
}

/// Drives one session from its goal to a terminal status.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    store: Arc<dyn MemoryStore>,
    tools: Arc<ToolRegistry>,
    assembler: Arc<dyn PromptAssembler>,
    events: Arc<EventBus>,
    config: AgentConfig,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        store: Arc<dyn MemoryStore>,
        tools: Arc<ToolRegistry>,
        events: Arc<EventBus>,
    ) -> Self {
        let config = AgentConfig::default();
        Self {
            provider,
            model: model.into(),
            temperature: 0.2,
            max_tokens: None,
            store,
            tools,
            assembler: Arc::new(default_assembler(&config)),
            events,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Apply loop settings. Also rebuilds the default prompt assembler so it
    /// picks up the system prompt override and final answer marker.
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.assembler = Arc::new(default_assembler(&config));
        self.config = config;
        self
    }

    pub fn with_assembler(mut self, assembler: Arc<dyn PromptAssembler>) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run a session to completion.
    pub async fn run(&self, target: SessionTarget) -> Result<RunOutcome, SessionLoadError> {
        let (mut ctx, mut state) = self.init(target).await?;
        let status = loop {
            match state {
                LoopState::Terminated(status) => break status,
                other => state = self.step(other, &mut ctx).await,
            }
        };
        Ok(self.finish(&ctx, status).await)
    }

    /// Load or create the session and decide the first state.
    ///
    /// Fails fast: an unreachable store or a corrupt record aborts the run
    /// before anything is written.
    pub async fn init(&self, target: SessionTarget) -> Result<(TaskContext, LoopState), SessionLoadError> {
        let (session, follow_up, resumed) = match target {
            SessionTarget::New { goal } => {
                let session = self.store.create_session(&goal).await?;
                info!(session_id = %session.id, "Created session");
                (session, None, false)
            }
            SessionTarget::Resume {
                session_id,
                follow_up,
            } => (self.store.load_session(&session_id).await?, follow_up, true),
            SessionTarget::Latest { follow_up } => {
                let latest = self
                    .store
                    .list_sessions(1)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or(SessionLoadError::NothingToContinue)?;
                (self.store.load_session(&latest.id).await?, follow_up, true)
            }
        };
        session.verify_contiguous().map_err(SessionLoadError::Corrupt)?;
        if session.messages.is_empty() {
            return Err(SessionLoadError::Corrupt(format!(
                "session {} has no goal message",
                session.id
            )));
        }

        let mut ctx = TaskContext::from_session(session, resumed);

        if let Some(prompt) = follow_up {
            let draft = vec![MessageDraft::user(prompt)];
            let range = self
                .store
                .append_messages(ctx.session_id(), ctx.next_seq(), draft.clone())
                .await?;
            ctx.apply_commit(range, draft);
        } else if ctx.session.status == SessionStatus::Completed {
            info!(session_id = %ctx.session.id, "Session already completed");
            return Ok((ctx, LoopState::Terminated(SessionStatus::Completed)));
        }

        if ctx.session.status != SessionStatus::Active {
            self.store
                .update_status(ctx.session_id(), &SessionStatus::Active)
                .await?;
            ctx.session.status = SessionStatus::Active;
        }

        self.events.publish(DomainEvent::SessionStarted {
            session_id: ctx.session.id.to_string(),
            resumed: ctx.resumed,
            next_seq: ctx.next_seq(),
            timestamp: chrono::Utc::now(),
        });
        info!(
            session_id = %ctx.session.id,
            resumed = ctx.resumed,
            next_seq = ctx.next_seq(),
            turn = ctx.turn,
            "Session started"
        );

        // A final answer that was committed before the status write failed.
        let state = if ctx.session.final_answer().is_some() {
            LoopState::Terminated(SessionStatus::Completed)
        } else {
            LoopState::AwaitingModel
        };
        Ok((ctx, state))
    }

    /// Perform one transition.
    pub async fn step(&self, state: LoopState, ctx: &mut TaskContext) -> LoopState {
        debug!(session_id = %ctx.session.id, state = state_name(&state), "Step");
        match state {
            LoopState::AwaitingModel => self.await_model(ctx).await,
            LoopState::DispatchingTools { calls } => self.dispatch_tools(calls, ctx).await,
            LoopState::Persisting { then } => self.persist(then, ctx).await,
            terminal @ LoopState::Terminated(_) => terminal,
        }
    }

    async fn await_model(&self, ctx: &mut TaskContext) -> LoopState {
        if self.cancel.is_cancelled() {
            return LoopState::Terminated(AgentError::Cancelled.to_status());
        }
        if ctx.turn >= self.config.max_turns {
            warn!(session_id = %ctx.session.id, turns = ctx.turn, "Turn limit reached");
            return LoopState::Terminated(AgentError::TurnLimitExceeded(self.config.max_turns).to_status());
        }

        let turn = ctx.turn + 1;
        self.events.publish(DomainEvent::TurnStarted {
            session_id: ctx.session.id.to_string(),
            turn,
            timestamp: chrono::Utc::now(),
        });

        let tools = self.tools.definitions();
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: self.assembler.assemble(&ctx.session, &tools),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools,
        };

        let response = match self.call_model(&request, &ctx.session.id).await {
            Ok(response) => response,
            Err(RetryError::Cancelled) => {
                return LoopState::Terminated(AgentError::Cancelled.to_status());
            }
            Err(RetryError::Permanent(e)) => {
                warn!(session_id = %ctx.session.id, error = %e, "Model call failed");
                return LoopState::Terminated(AgentError::Transport(e.to_string()).to_status());
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                warn!(session_id = %ctx.session.id, attempts, error = %last, "Model unreachable");
                return LoopState::Terminated(
                    AgentError::Transport(format!("model unreachable after {attempts} attempts: {last}"))
                        .to_status(),
                );
            }
        };

        let tokens = response.usage.as_ref().map(|u| u.total_tokens).unwrap_or(0);
        ctx.tokens_used += u64::from(tokens);
        self.events.publish(DomainEvent::ModelResponded {
            session_id: ctx.session.id.to_string(),
            model: response.model.clone(),
            tool_calls: response.tool_calls.len(),
            tokens_used: tokens,
            timestamp: chrono::Utc::now(),
        });

        let marker = self.config.final_answer_marker.as_deref();
        match parse_model_output(&response, ctx.next_seq(), marker) {
            ModelOutput::FinalAnswer(answer) => {
                info!(session_id = %ctx.session.id, turn, "Model gave a final answer");
                ctx.pending.push(MessageDraft::model(answer));
                LoopState::Persisting {
                    then: AfterCommit::Complete,
                }
            }
            ModelOutput::ToolCalls { content, calls } => {
                debug!(session_id = %ctx.session.id, turn, calls = calls.len(), "Model requested tools");
                ctx.pending.push(MessageDraft::model_with_calls(content, calls.clone()));
                LoopState::DispatchingTools { calls }
            }
            ModelOutput::Malformed { raw, problem } => {
                let attempt = ctx.corrective_attempts + 1;
                let max = self.config.max_corrective_retries;
                warn!(session_id = %ctx.session.id, turn, attempt, %problem, "Malformed model output");
                ctx.pending.push(MessageDraft::rejected(raw, problem.clone()));
                if attempt > max {
                    return LoopState::Persisting {
                        then: AfterCommit::Fail(AgentError::MalformedModelOutput {
                            attempts: attempt,
                            detail: problem,
                        }),
                    };
                }
                ctx.pending
                    .push(MessageDraft::correction(correction_prompt(&problem, attempt, max), attempt));
                LoopState::Persisting {
                    then: AfterCommit::Continue,
                }
            }
        }
    }

    async fn call_model(
        &self,
        request: &ProviderRequest,
        session_id: &SessionId,
    ) -> Result<ProviderResponse, RetryError<ProviderError>> {
        let timeout = self.config.model_timeout();
        RetryPolicy::for_model(&self.config)
            .run(
                &self.cancel,
                move || async move {
                    match tokio::time::timeout(timeout, self.provider.complete(request.clone())).await {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::Timeout(format!(
                            "no response within {}s",
                            timeout.as_secs_f64()
                        ))),
                    }
                },
                ProviderError::is_transient,
                |attempt, delay, err| self.announce_retry(session_id, "model", attempt, delay, err),
            )
            .await
    }

    async fn dispatch_tools(&self, calls: Vec<ToolCall>, ctx: &mut TaskContext) -> LoopState {
        let timeout = self.config.tool_timeout();
        let concurrency = self.config.tool_concurrency.max(1);

        // Calls already running when the run is cancelled are drained to their
        // own result or timeout; only calls never started become `Cancelled`.
        let mut results: Vec<ToolResult> = Vec::with_capacity(calls.len());
        let mut queued = calls.iter();
        let mut running = FuturesOrdered::new();
        let mut cancelled = false;
        loop {
            cancelled = cancelled || self.cancel.is_cancelled();
            if !cancelled {
                while running.len() < concurrency {
                    match queued.next() {
                        Some(call) => running.push_back(self.tools.dispatch(call, timeout)),
                        None => break,
                    }
                }
            }
            if running.is_empty() {
                break;
            }
            if cancelled {
                if let Some(result) = running.next().await {
                    results.push(result);
                }
                continue;
            }
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => cancelled = true,
                next = running.next() => {
                    if let Some(result) = next {
                        results.push(result);
                    }
                }
            }
        }

        let skipped = calls.len() - results.len();
        for call in &calls[results.len()..] {
            results.push(ToolResult::cancelled(call));
        }
        if cancelled {
            warn!(session_id = %ctx.session.id, skipped, "Cancelled during tool dispatch");
        }

        for result in results {
            self.events.publish(DomainEvent::ToolExecuted {
                session_id: ctx.session.id.to_string(),
                tool_name: result.tool_name.clone(),
                success: result.success,
                duration_ms: result.duration_ms,
                timestamp: chrono::Utc::now(),
            });
            ctx.pending.push(MessageDraft::tool_result(result));
        }

        LoopState::Persisting {
            then: if cancelled {
                AfterCommit::Fail(AgentError::Cancelled)
            } else {
                AfterCommit::Continue
            },
        }
    }

    async fn persist(&self, then: AfterCommit, ctx: &mut TaskContext) -> LoopState {
        // A cancelled run still commits the finished turn, then stops. A final
        // answer is kept as completed: once committed, resume treats it so.
        let then = match then {
            AfterCommit::Continue if self.cancel.is_cancelled() => {
                debug!(session_id = %ctx.session.id, "Cancelled before commit, stopping after this turn");
                AfterCommit::Fail(AgentError::Cancelled)
            }
            other => other,
        };
        let drafts = ctx.pending.clone();
        let expected = ctx.next_seq();
        let session_id = ctx.session.id.clone();

        let committed = RetryPolicy::for_store(&self.config)
            .run_to_completion(
                &self.cancel,
                || self.store.append_messages(&session_id, expected, drafts.clone()),
                MemoryError::is_transient,
                |attempt, delay, err| self.announce_retry(&session_id, "append", attempt, delay, err),
            )
            .await;

        let failure = match committed {
            Ok(range) => {
                ctx.pending.clear();
                ctx.apply_commit(range, drafts);
                self.events.publish(DomainEvent::MessagesCommitted {
                    session_id: session_id.to_string(),
                    first_seq: range.start,
                    count: range.len(),
                    timestamp: chrono::Utc::now(),
                });
                debug!(session_id = %session_id, first_seq = range.start, count = range.len(), "Turn committed");
                return match then {
                    AfterCommit::Continue => LoopState::AwaitingModel,
                    AfterCommit::Complete => LoopState::Terminated(SessionStatus::Completed),
                    AfterCommit::Fail(err) => LoopState::Terminated(err.to_status()),
                };
            }
            Err(RetryError::Cancelled) => AgentError::Cancelled,
            Err(RetryError::Permanent(e)) => AgentError::from_store(e),
            Err(RetryError::Exhausted { attempts, last }) => {
                AgentError::Transport(format!("store unreachable after {attempts} attempts: {last}"))
            }
        };

        warn!(
            session_id = %session_id,
            drafts = drafts.len(),
            error = %failure,
            "Turn was not committed"
        );
        ctx.abandon_pending();
        LoopState::Terminated(failure.to_status())
    }

    /// Write the terminal status and build the outcome.
    async fn finish(&self, ctx: &TaskContext, status: SessionStatus) -> RunOutcome {
        let session_id = ctx.session.id.clone();
        let lost_ownership = status
            .failure()
            .is_some_and(|r| r.kind == FailureKind::SequenceConflict);
        let persisted = if ctx.session.status == status {
            true
        } else if lost_ownership {
            // Another writer owns the session now; its status is not ours to set.
            warn!(session_id = %session_id, "Leaving stored status to the competing writer");
            false
        } else {
            // The status write goes ahead even when the run was cancelled.
            let written = RetryPolicy::for_store(&self.config)
                .run_to_completion(
                    &CancellationToken::new(),
                    || self.store.update_status(&session_id, &status),
                    MemoryError::is_transient,
                    |attempt, delay, err| self.announce_retry(&session_id, "update_status", attempt, delay, err),
                )
                .await;
            match written {
                Ok(()) => true,
                Err(e) => {
                    let detail = match e {
                        RetryError::Permanent(e) | RetryError::Exhausted { last: e, .. } => e.to_string(),
                        RetryError::Cancelled => "cancelled".into(),
                    };
                    warn!(session_id = %session_id, error = %detail, "Could not record final status");
                    false
                }
            }
        };

        self.events.publish(DomainEvent::SessionTerminated {
            session_id: session_id.to_string(),
            status: status.clone(),
            timestamp: chrono::Utc::now(),
        });
        info!(
            session_id = %session_id,
            status = %status,
            turns = ctx.turn,
            committed = ctx.next_seq(),
            uncommitted = ctx.uncommitted,
            "Session terminated"
        );

        RunOutcome::from_context(ctx, status, persisted)
    }

    fn announce_retry(
        &self,
        session_id: &SessionId,
        operation: &str,
        attempt: u32,
        delay: std::time::Duration,
        err: &dyn std::fmt::Display,
    ) {
        warn!(
            session_id = %session_id,
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transient failure, retrying"
        );
        self.events.publish(DomainEvent::RetryScheduled {
            session_id: session_id.to_string(),
            operation: operation.to_string(),
            attempt,
            delay_ms: delay.as_millis() as u64,
            error_message: err.to_string(),
            timestamp: chrono::Utc::now(),
        });
    }
}

fn default_assembler(config: &AgentConfig) -> DefaultPromptAssembler {
    DefaultPromptAssembler::new()
        .with_system_prompt(config.system_prompt_override.clone())
        .with_final_answer_marker(config.final_answer_marker.clone())
}

fn state_name(state: &LoopState) -> &'static str {
    match state {
        LoopState::AwaitingModel => "awaiting_model",
        LoopState::DispatchingTools { .. } => "dispatching_tools",
        LoopState::Persisting { .. } => "persisting",
        LoopState::Terminated(_) => "terminated",
    }
}
