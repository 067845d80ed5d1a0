pub mod client;
pub mod types;

use async_trait::async_trait;
use serde_json::Value;

pub use client::{LlmClient, OpenAiProvider};
pub use types::{ChatMessage, LlmConfig, LlmError, LlmResponse, ToolCall, ToolFunction};

/// One chat-completions endpoint bound to a key.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat_with_tools(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<Value>,
    ) -> Result<LlmResponse, LlmError>;
}

/// Creates a backend for the key supplied with a run.
pub trait ChatProvider: Send + Sync {
    fn backend(&self, api_key: &str) -> Result<Box<dyn ChatBackend>, LlmError>;
}
