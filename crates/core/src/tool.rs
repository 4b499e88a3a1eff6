//! Tool trait and registry.
//!
//! Tools are the agent's only way to act: run a shell command, inspect the
//! environment. The set of tools is closed once the registry is built, and
//! a call to an unknown name is reported as a typed [`ToolResult`], never
//! as an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use crate::schema;

/// A request from the model to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments, always a JSON object
    pub arguments: serde_json::Map<String, serde_json::Value>,

    /// Sequence number of the model message that requested this call
    pub origin_seq: u64,
}

/// Why a tool call did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    UnknownTool,
    InvalidArguments,
    ToolTimeout,
    ExecutionFailed,
    PermissionDenied,
    Cancelled,
}

/// The error half of a [`ToolResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub kind: ToolErrorKind,
    pub message: String,
}

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    pub tool_name: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// Structured output (null when the tool never ran)
    #[serde(default)]
    pub output: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolFailure>,

    pub duration_ms: u64,
}

impl ToolResult {
    /// A result for a call that failed before or instead of producing output.
    pub fn failure(
        call: &ToolCall,
        kind: ToolErrorKind,
        message: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            success: false,
            output: serde_json::Value::Null,
            error: Some(ToolFailure {
                kind,
                message: message.into(),
            }),
            duration_ms,
        }
    }

    /// A call that was cut short by cancellation.
    pub fn cancelled(call: &ToolCall) -> Self {
        Self::failure(call, ToolErrorKind::Cancelled, "run was cancelled", 0)
    }

    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// The text the model sees for this result.
    pub fn render(&self) -> String {
        let body = match &self.error {
            Some(failure) => serde_json::json!({
                "error": failure.kind,
                "message": failure.message,
                "output": self.output,
            }),
            None => self.output.clone(),
        };
        body.to_string()
    }
}

/// What an executor hands back when it ran to completion.
///
/// `success` is false when the tool ran but the operation it performed did
/// not succeed (a non-zero exit code, for instance).
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub success: bool,
    pub payload: serde_json::Value,
}

impl ToolOutput {
    pub fn ok(payload: serde_json::Value) -> Self {
        Self {
            success: true,
            payload,
        }
    }

    pub fn failed(payload: serde_json::Value) -> Self {
        Self {
            success: false,
            payload,
        }
    }
}

/// The core Tool trait.
///
/// Each tool (shell, environment_info) implements this trait. Arguments are
/// validated against [`Tool::parameters_schema`] before `execute` is called.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "shell").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with already-validated arguments.
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Collects tools before a run. Frozen into a [`ToolRegistry`] by `build()`.
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(mut self, tool: impl Tool + 'static) -> Self {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Arc::new(tool)).is_some() {
            tracing::warn!(tool = %name, "Replacing previously registered tool");
        }
        self
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry { tools: self.tools }
    }
}

/// An immutable set of tools.
///
/// The agent loop uses this to:
/// 1. Get tool definitions to send to the model
/// 2. Dispatch the model's tool calls
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// All tool definitions, ordered by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool call. Every failure mode is folded into the result.
    pub async fn dispatch(&self, call: &ToolCall, timeout: Duration) -> ToolResult {
        let start = Instant::now();

        let Some(tool) = self.tools.get(&call.name) else {
            tracing::warn!(tool = %call.name, call_id = %call.id, "Model requested an unknown tool");
            return ToolResult::failure(
                call,
                ToolErrorKind::UnknownTool,
                format!(
                    "no tool named '{}' (available: {})",
                    call.name,
                    self.names().join(", ")
                ),
                0,
            );
        };

        let arguments = serde_json::Value::Object(call.arguments.clone());
        if let Err(violation) = schema::validate(&tool.parameters_schema(), &arguments) {
            tracing::warn!(tool = %call.name, call_id = %call.id, %violation, "Rejected tool arguments");
            return ToolResult::failure(call, ToolErrorKind::InvalidArguments, violation, 0);
        }

        tracing::debug!(tool = %call.name, call_id = %call.id, "Executing tool");
        let outcome = tokio::time::timeout(timeout, tool.execute(arguments)).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(output)) => ToolResult {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                success: output.success,
                output: output.payload,
                error: None,
                duration_ms,
            },
            Ok(Err(err)) => {
                let kind = match &err {
                    ToolError::InvalidArguments(_) => ToolErrorKind::InvalidArguments,
                    ToolError::PermissionDenied { .. } => ToolErrorKind::PermissionDenied,
                    ToolError::ExecutionFailed { .. } => ToolErrorKind::ExecutionFailed,
                };
                tracing::warn!(tool = %call.name, call_id = %call.id, error = %err, "Tool failed");
                ToolResult::failure(call, kind, err.to_string(), duration_ms)
            }
            Err(_) => {
                tracing::warn!(
                    tool = %call.name,
                    call_id = %call.id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Tool timed out"
                );
                ToolResult::failure(
                    call,
                    ToolErrorKind::ToolTimeout,
                    format!("tool did not finish within {}s", timeout.as_secs_f64()),
                    duration_ms,
                )
            }
        }
    }
}
