use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

use crate::llm::types::*;
use crate::llm::{ChatBackend, ChatProvider};

// Upper bound for a single completion request; the dispatcher enforces the run budget.
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

pub struct LlmClient {
    http: Client,
    config: LlmConfig,
    api_key: String,
}

impl LlmClient {
    pub fn new(config: LlmConfig, api_key: String) -> Result<Self, LlmError> {
        if api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Client(e.to_string()))?;

        Ok(Self { http, config, api_key })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn headers(&self) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| LlmError::Client("API key is not a valid header value".to_string()))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Add extra headers from config
        if let Some(obj) = self.config.extra_headers.as_object() {
            for (key, value) in obj {
                if let Some(val_str) = value.as_str() {
                    if let (Ok(header_name), Ok(header_value)) = (
                        HeaderName::from_bytes(key.as_bytes()),
                        val_str.parse::<HeaderValue>(),
                    ) {
                        headers.insert(header_name, header_value);
                    }
                }
            }
        }

        Ok(headers)
    }

    pub async fn chat_with_tools(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<Value>,
    ) -> Result<LlmResponse, LlmError> {
        let request = OpenAIChatRequest {
            model: self.config.model.clone(),
            messages,
            tools: if tools.is_empty() { None } else { Some(tools) },
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
            stream: false,
        };

        let response = self
            .http
            .post(self.completions_url())
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, error_text));
        }

        let result: OpenAIChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        tracing::debug!(
            response_id = %result.id,
            model = %result.model,
            choices = result.choices.len(),
            "chat completion received"
        );

        first_choice(result)
    }
}

fn classify_status(status: StatusCode, error_text: String) -> LlmError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited,
        StatusCode::UNAUTHORIZED => LlmError::Api {
            status: 401,
            message: "Invalid API key".to_string(),
        },
        _ => LlmError::Api {
            status: status.as_u16(),
            message: error_text,
        },
    }
}

fn first_choice(result: OpenAIChatResponse) -> Result<LlmResponse, LlmError> {
    if let Some(choice) = result.choices.into_iter().next() {
        Ok(LlmResponse {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls,
        })
    } else {
        Err(LlmError::InvalidResponse("No choices in response".to_string()))
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    async fn chat_with_tools(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<Value>,
    ) -> Result<LlmResponse, LlmError> {
        LlmClient::chat_with_tools(self, messages, tools).await
    }
}

/// Builds an [`LlmClient`] per run from the shared config and the run's key.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    config: LlmConfig,
}

impl OpenAiProvider {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }
}

impl ChatProvider for OpenAiProvider {
    fn backend(&self, api_key: &str) -> Result<Box<dyn ChatBackend>, LlmError> {
        let client = LlmClient::new(self.config.clone(), api_key.to_string())?;
        Ok(Box::new(client))
    }
}
