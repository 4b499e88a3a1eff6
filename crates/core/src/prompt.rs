//! Prompt assembly: session history in, provider transcript out.

use crate::message::{Message, MessagePayload, Role};
use crate::provider::{ChatMessage, RawToolCall, ToolDefinition};
use crate::session::Session;

/// The default system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a highly capable assistant with access to the local machine's shell. Your goal is to complete the user's task carefully by forming a robust plan and executing it step by step.

**Your Tool Kit**

- `environment_info` reports the operating system, architecture, default shell and package manager.
- `shell` runs one command and returns its exit code, stdout and stderr.

**Core Principle: Verify, Then Act**

Do not blindly trust statements about the state of the system. For any task that implies a program is already installed (update, run, configure, check the version of), follow this plan:

1. Run a simple, non-destructive check first, typically `<program> --version`.
2. If it succeeds, the program is installed and you can proceed with the original request.
3. If it fails with reason `CommandNotInstalled`, do not attempt the original request. Tell the user the program is not installed and ask whether they would like you to install it.

**Sudo and Installation Policy**

- When your plan needs `sudo`, run the command directly without asking for permission.
- Sudo runs non-interactively. If the result carries reason `PasswordRequired`, stop and tell the user which command needs elevated rights.

When the task is done, reply with a short final answer and no tool calls."#;

/// Renders a session into the messages sent to the model.
pub trait PromptAssembler: Send + Sync {
    fn assemble(&self, session: &Session, tools: &[ToolDefinition]) -> Vec<ChatMessage>;
}

/// The built-in assembler: system prompt, then the full history.
#[derive(Debug, Clone, Default)]
pub struct DefaultPromptAssembler {
    system_prompt_override: Option<String>,
    final_answer_marker: Option<String>,
}

impl DefaultPromptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt_override = prompt;
        self
    }

    /// Ask the model to prefix its final answer with `marker`.
    pub fn with_final_answer_marker(mut self, marker: Option<String>) -> Self {
        self.final_answer_marker = marker;
        self
    }

    fn system_prompt(&self, tools: &[ToolDefinition]) -> String {
        let mut prompt = self
            .system_prompt_override
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        if !tools.is_empty() {
            prompt.push_str("\n\n**Available tools**\n");
            for tool in tools {
                prompt.push_str(&format!("\n- `{}`: {}", tool.name, tool.description));
            }
        }

        if let Some(marker) = &self.final_answer_marker {
            prompt.push_str(&format!(
                "\n\nBegin your final answer with `{marker}` so it can be recognised."
            ));
        }

        prompt
    }
}

impl PromptAssembler for DefaultPromptAssembler {
    fn assemble(&self, session: &Session, tools: &[ToolDefinition]) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(session.messages.len() + 1);
        out.push(ChatMessage::system(self.system_prompt(tools)));
        out.extend(session.messages.iter().map(to_chat));
        out
    }
}

fn to_chat(message: &Message) -> ChatMessage {
    match (message.role, &message.payload) {
        (Role::Model, Some(MessagePayload::ToolCalls { calls })) => {
            let raw = calls
                .iter()
                .map(|c| RawToolCall {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    arguments: serde_json::Value::Object(c.arguments.clone()).to_string(),
                })
                .collect();
            ChatMessage::assistant_with_calls(message.content.clone(), raw)
        }
        (Role::Model, _) if message.content.trim().is_empty() => {
            ChatMessage::assistant("(empty response)")
        }
        (Role::Model, _) => ChatMessage::assistant(message.content.clone()),
        (Role::Tool, Some(MessagePayload::ToolResult { result })) => {
            ChatMessage::tool_result(result.call_id.clone(), message.content.clone())
        }
        // A tool message without its payload has no call id to answer
        (Role::Tool, _) => ChatMessage::user(format!("Tool output: {}", message.content)),
        (Role::User, _) => ChatMessage::user(message.content.clone()),
    }
}
