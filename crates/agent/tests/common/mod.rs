//! Test doubles shared by the agent loop integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use sentient_agent::Orchestrator;
use sentient_config::AgentConfig;
use sentient_core::error::{MemoryError, ProviderError, ToolError};
use sentient_core::event::EventBus;
use sentient_core::memory::{MemoryStore, SeqRange, SessionSummary};
use sentient_core::message::MessageDraft;
use sentient_core::provider::{Provider, ProviderRequest, ProviderResponse, RawToolCall, Usage};
use sentient_core::session::{Session, SessionId, SessionStatus};
use sentient_core::tool::{Tool, ToolOutput, ToolRegistry};
use sentient_memory::InMemoryStore;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// --- Provider ---

pub enum Step {
    Respond(ProviderResponse),
    /// Answer, but only after the given delay.
    Delayed(Duration, ProviderResponse),
    Fail(ProviderError),
    Hang,
    /// Cancel the run, then answer anyway.
    CancelThen(CancellationToken, ProviderResponse),
}

/// A provider that plays back a fixed script and records every request.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Delayed(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Some(Step::Fail(err)) => Err(err),
            Some(Step::CancelThen(cancel, response)) => {
                cancel.cancel();
                Ok(response)
            }
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Err(ProviderError::Network("hung".into()))
            }
            None => Err(ProviderError::InvalidResponse("script exhausted".into())),
        }
    }
}

pub fn answer(text: &str) -> Step {
    Step::Respond(text_response(text))
}

pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        content: text.into(),
        tool_calls: Vec::new(),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

pub fn calls(content: &str, calls: &[(&str, &str, serde_json::Value)]) -> Step {
    Step::Respond(ProviderResponse {
        content: content.into(),
        tool_calls: calls
            .iter()
            .map(|(id, name, args)| RawToolCall {
                id: (*id).into(),
                name: (*name).into(),
                arguments: args.to_string(),
            })
            .collect(),
        usage: None,
        model: "mock-model".into(),
    })
}

pub fn raw_call(name: &str, arguments: &str) -> Step {
    Step::Respond(ProviderResponse {
        content: String::new(),
        tool_calls: vec![RawToolCall {
            id: "call_raw".into(),
            name: name.into(),
            arguments: arguments.into(),
        }],
        usage: None,
        model: "mock-model".into(),
    })
}

// --- Store ---

/// Wraps an in-memory store and injects failures on demand.
pub struct FlakyStore {
    inner: InMemoryStore,
    /// Appends still to fail with `Unavailable`; `u32::MAX` fails forever.
    pub failing_appends: AtomicU32,
    pub fail_status: AtomicBool,
    pub fail_loads: AtomicBool,
    /// Before the next append, commit a message as if another writer did.
    pub interleave_writer: AtomicBool,
    pub appends_seen: AtomicU32,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryStore::new(),
            failing_appends: AtomicU32::new(0),
            fail_status: AtomicBool::new(false),
            fail_loads: AtomicBool::new(false),
            interleave_writer: AtomicBool::new(false),
            appends_seen: AtomicU32::new(0),
        })
    }

    pub fn fail_next_appends(&self, n: u32) {
        self.failing_appends.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl MemoryStore for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn load_session(&self, id: &SessionId) -> Result<Session, MemoryError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(MemoryError::Unavailable("connection refused".into()));
        }
        self.inner.load_session(id).await
    }

    async fn create_session(&self, goal: &str) -> Result<Session, MemoryError> {
        self.inner.create_session(goal).await
    }

    async fn append_messages(
        &self,
        id: &SessionId,
        expected_next_seq: u64,
        drafts: Vec<MessageDraft>,
    ) -> Result<SeqRange, MemoryError> {
        self.appends_seen.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_appends.load(Ordering::SeqCst);
        if failing > 0 {
            if failing != u32::MAX {
                self.failing_appends.store(failing - 1, Ordering::SeqCst);
            }
            return Err(MemoryError::Unavailable("connection reset".into()));
        }
        if self.interleave_writer.swap(false, Ordering::SeqCst) {
            let next = self.inner.load_session(id).await?.next_seq();
            self.inner
                .append_messages(id, next, vec![MessageDraft::user("written elsewhere")])
                .await?;
        }
        self.inner.append_messages(id, expected_next_seq, drafts).await
    }

    async fn update_status(&self, id: &SessionId, status: &SessionStatus) -> Result<(), MemoryError> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(MemoryError::Unavailable("connection reset".into()));
        }
        self.inner.update_status(id, status).await
    }

    async fn list_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>, MemoryError> {
        self.inner.list_sessions(limit).await
    }

    async fn delete_session(&self, id: &SessionId) -> Result<bool, MemoryError> {
        self.inner.delete_session(id).await
    }
}

// --- Tools ---

/// Sleeps for `ms` milliseconds, then reports how long it slept.
pub struct SleepTool;

#[async_trait]
impl Tool for SleepTool {
    fn name(&self) -> &str {
        "sleep"
    }
    fn description(&self) -> &str {
        "Sleep for a while"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": { "ms": { "type": "integer" } },
            "required": ["ms"],
            "additionalProperties": false
        })
    }
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let ms = arguments["ms"].as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(ToolOutput::ok(json!({ "slept_ms": ms })))
    }
}

/// Pulls the plug on the run and returns straight away.
pub struct CancellingTool(pub CancellationToken);

#[async_trait]
impl Tool for CancellingTool {
    fn name(&self) -> &str {
        "pull_plug"
    }
    fn description(&self) -> &str {
        "Cancels the run"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        json!({ "type": "object", "properties": {} })
    }
    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        self.0.cancel();
        Ok(ToolOutput::ok(json!({ "cancelled": true })))
    }
}

pub fn registry() -> Arc<ToolRegistry> {
    Arc::new(
        ToolRegistry::builder()
            .register(SleepTool)
            .register(sentient_tools::EnvironmentInfoTool::new())
            .register(sentient_tools::ShellTool::new(Vec::new()))
            .build(),
    )
}

pub fn fast_config() -> AgentConfig {
    AgentConfig {
        backoff_initial_ms: 10,
        backoff_max_ms: 100,
        ..AgentConfig::default()
    }
}

pub fn orchestrator(
    provider: Arc<dyn Provider>,
    store: Arc<dyn MemoryStore>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
) -> Orchestrator {
    Orchestrator::new(provider, "mock-model", store, tools, Arc::new(EventBus::new(256))).with_config(config)
}
