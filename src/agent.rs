use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::llm::{ChatBackend, ChatMessage, LlmError, ToolCall};
use crate::models::ToolCallRow;
use crate::tool_server::logging::truncate_string;
use crate::tool_server::{log_tool_call, tool_schemas, ToolSession};

pub const MAX_TOOL_ITERATIONS: usize = 12;
const MAX_CONTEXT_CHARS: usize = 100_000;
const MAX_TOOL_OUTPUT_CHARS: usize = 50_000;
const KEEP_RECENT_MESSAGES: usize = 6;
const CLIPPED_NOTE: &str = "\n[output clipped]";

const GITHUB_ASSISTANT: &str = "You are a GitHub assistant.
- Help users explore repositories, issues, pull requests, and activity
- Be factual and concise
- Use markdown formatting
- Include links when useful";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionProfile {
    pub instructions: String,
    pub markdown: bool,
}

impl InstructionProfile {
    pub fn github_assistant() -> Self {
        Self {
            instructions: GITHUB_ASSISTANT.to_string(),
            markdown: true,
        }
    }

    pub fn system_prompt(&self) -> String {
        if self.markdown {
            format!("{}\n\nUse markdown to format your answers.", self.instructions)
        } else {
            self.instructions.clone()
        }
    }
}

impl Default for InstructionProfile {
    fn default() -> Self {
        Self::github_assistant()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("run cancelled")]
    Cancelled,
    #[error("reached maximum tool call limit ({0})")]
    ToolLimit(usize),
}

/// Tool-calling loop over one chat backend and one tool session.
pub struct Agent<'a> {
    backend: &'a dyn ChatBackend,
    session: &'a dyn ToolSession,
    profile: InstructionProfile,
    run_id: String,
}

impl<'a> Agent<'a> {
    pub fn new(
        backend: &'a dyn ChatBackend,
        session: &'a dyn ToolSession,
        profile: InstructionProfile,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            session,
            profile,
            run_id: run_id.into(),
        }
    }

    /// Answers `message`, recording every tool invocation into `calls` as it
    /// happens so the log survives an abandoned run.
    pub async fn run(
        &self,
        message: &str,
        cancel: &CancellationToken,
        calls: &mut Vec<ToolCallRow>,
    ) -> Result<String, AgentError> {
        let mut messages = vec![
            ChatMessage::system(self.profile.system_prompt()),
            ChatMessage::user(message),
        ];
        let tools = tool_schemas(self.session.tools());

        for iteration in 0..MAX_TOOL_ITERATIONS {
            let context_size: usize = messages.iter().map(ChatMessage::content_len).sum();
            if context_size > MAX_CONTEXT_CHARS {
                tracing::debug!(context_size, "trimming conversation context");
                messages = truncate_messages(messages);
                fit_tool_outputs(&mut messages, MAX_CONTEXT_CHARS);
            }

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                res = self.backend.chat_with_tools(messages.clone(), tools.clone()) => res?,
            };

            let tool_calls = response.tool_calls.unwrap_or_default();
            if tool_calls.is_empty() {
                tracing::debug!(iteration, "final answer received");
                return Ok(response.content.unwrap_or_default());
            }

            tracing::debug!(iteration, count = tool_calls.len(), "model requested tools");
            messages.push(ChatMessage::assistant(response.content, Some(tool_calls.clone())));

            for call in &tool_calls {
                let content = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                    content = self.execute_tool(call, calls) => content,
                };
                messages.push(ChatMessage::tool(call.id.clone(), content));
            }
        }

        Err(AgentError::ToolLimit(MAX_TOOL_ITERATIONS))
    }

    // Tool failures go back to the model as data; they never end the run.
    async fn execute_tool(&self, call: &ToolCall, calls: &mut Vec<ToolCallRow>) -> String {
        let name = call.function.name.as_str();
        let args = match parse_arguments(&call.function.arguments) {
            Ok(args) => args,
            Err(e) => {
                let result = json!({ "error": e });
                calls.push(log_tool_call(&self.run_id, name, &Value::Null, &result, true));
                return result.to_string();
            }
        };

        let (result, is_error) = match self.session.call_tool(name, args.clone()).await {
            Ok(output) => {
                let (mut text, truncated) = truncate_string(&output.to_text(), MAX_TOOL_OUTPUT_CHARS);
                if truncated {
                    text.push_str("\n[output truncated]");
                }
                if output.is_error {
                    (json!({ "error": text }), true)
                } else {
                    (Value::String(text), false)
                }
            }
            Err(e) => (json!({ "error": e.to_string() }), true),
        };

        calls.push(log_tool_call(&self.run_id, name, &args, &result, is_error));
        match result {
            Value::String(text) => text,
            other => other.to_string(),
        }
    }
}

fn parse_arguments(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Null) => Ok(json!({})),
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err("tool arguments must be a JSON object".to_string()),
        Err(e) => Err(format!("Failed to parse tool args: {}", e)),
    }
}

/// Keeps the system prompt, the question and the most recent exchanges. An
/// exchange is an assistant turn together with its tool results, and is kept
/// or dropped as a whole. The newest exchange always survives.
fn truncate_messages(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    if messages.len() <= 2 + KEEP_RECENT_MESSAGES {
        return messages;
    }

    let mut iter = messages.into_iter();
    let mut result: Vec<ChatMessage> = iter.by_ref().take(2).collect();
    let rest: Vec<ChatMessage> = iter.collect();

    let mut start = rest.len();
    for i in (0..rest.len()).rev() {
        if rest[i].role == "tool" {
            continue;
        }
        if start < rest.len() && rest.len() - i > KEEP_RECENT_MESSAGES {
            break;
        }
        start = i;
    }
    result.extend(rest.into_iter().skip(start));
    result
}

/// Clips tool results evenly until the conversation fits in `budget` bytes.
fn fit_tool_outputs(messages: &mut [ChatMessage], budget: usize) {
    let total: usize = messages.iter().map(ChatMessage::content_len).sum();
    let tool_count = messages.iter().filter(|m| m.role == "tool").count();
    if total <= budget || tool_count == 0 {
        return;
    }

    let fixed: usize = messages
        .iter()
        .filter(|m| m.role != "tool")
        .map(ChatMessage::content_len)
        .sum();
    let share = budget.saturating_sub(fixed) / tool_count;

    for message in messages.iter_mut().filter(|m| m.role == "tool") {
        let Some(content) = message.content.as_mut() else {
            continue;
        };
        if content.len() <= share {
            continue;
        }
        let note = if share > CLIPPED_NOTE.len() { CLIPPED_NOTE } else { "" };
        let mut end = share - note.len();
        while !content.is_char_boundary(end) {
            end -= 1;
        }
        content.truncate(end);
        content.push_str(note);
    }
    tracing::debug!(tool_count, share, "clipped tool results to fit context");
}
