//! Interpreting a model response.

use sentient_core::provider::ProviderResponse;
use sentient_core::tool::ToolCall;

/// What the model asked for. Every response lands in exactly one variant.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    /// The task is done; the text is the answer.
    FinalAnswer(String),

    /// The model wants tools run before it continues.
    ToolCalls { content: String, calls: Vec<ToolCall> },

    /// Nothing usable. `raw` is persisted as-is, `problem` feeds the
    /// corrective prompt.
    Malformed { raw: String, problem: String },
}

/// Classify `response`. Calls are stamped with `origin_seq`, the sequence
/// number the model message will receive.
pub fn parse_model_output(
    response: &ProviderResponse,
    origin_seq: u64,
    final_answer_marker: Option<&str>,
) -> ModelOutput {
    if !response.tool_calls.is_empty() {
        return parse_tool_calls(response, origin_seq);
    }

    let text = response.content.trim();
    if text.is_empty() {
        return ModelOutput::Malformed {
            raw: response.content.clone(),
            problem: "the response was empty".into(),
        };
    }

    match final_answer_marker {
        Some(marker) if !text.contains(marker) => ModelOutput::Malformed {
            raw: response.content.clone(),
            problem: format!(
                "the response neither called a tool nor contained the final answer marker `{marker}`"
            ),
        },
        _ => ModelOutput::FinalAnswer(text.to_string()),
    }
}

fn parse_tool_calls(response: &ProviderResponse, origin_seq: u64) -> ModelOutput {
    let mut calls = Vec::with_capacity(response.tool_calls.len());
    let mut problems = Vec::new();

    for (index, raw) in response.tool_calls.iter().enumerate() {
        let name = raw.name.trim();
        if name.is_empty() {
            problems.push(format!("tool call #{} has no tool name", index + 1));
            continue;
        }

        // Models send "" for tools without parameters.
        let arguments = if raw.arguments.trim().is_empty() {
            Ok(serde_json::Map::new())
        } else {
            match serde_json::from_str::<serde_json::Value>(&raw.arguments) {
                Ok(serde_json::Value::Object(map)) => Ok(map),
                Ok(other) => Err(format!("arguments are {}, not a JSON object", kind_of(&other))),
                Err(e) => Err(format!("arguments are not valid JSON ({e})")),
            }
        };

        match arguments {
            Ok(arguments) => {
                let id = if raw.id.trim().is_empty() {
                    format!("call_{origin_seq}_{index}")
                } else {
                    raw.id.clone()
                };
                calls.push(ToolCall {
                    id,
                    name: name.to_string(),
                    arguments,
                    origin_seq,
                });
            }
            Err(problem) => problems.push(format!("tool call `{name}`: {problem}")),
        }
    }

    if problems.is_empty() {
        return ModelOutput::ToolCalls {
            content: response.content.clone(),
            calls,
        };
    }

    let mut raw = response.content.clone();
    for call in &response.tool_calls {
        if !raw.is_empty() {
            raw.push('\n');
        }
        raw.push_str(&format!("[tool call {}({})]", call.name, call.arguments));
    }
    ModelOutput::Malformed {
        raw,
        problem: problems.join("; "),
    }
}

fn kind_of(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// The corrective prompt sent after a malformed response.
pub fn correction_prompt(problem: &str, attempt: u32, max_attempts: u32) -> String {
    format!(
        "Your previous response could not be used: {problem}. \
         Either call one of the available tools with a JSON object of arguments, \
         or give your final answer as plain text. (Correction {attempt} of {max_attempts}.)"
    )
}
