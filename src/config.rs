use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use crate::llm::LlmConfig;

pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolServerConfig {
    /// Package handed to the runner as its only argument.
    pub package: String,
    /// Variable the server reads the access token from.
    pub token_env: String,
    pub toolsets_env: String,
    pub toolsets: String,
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            package: "@modelcontextprotocol/server-github".to_string(),
            token_env: "GITHUB_PERSONAL_ACCESS_TOKEN".to_string(),
            toolsets_env: "GITHUB_TOOLSETS".to_string(),
            toolsets: "repos,issues,pull_requests".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    pub run_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            run_timeout: DEFAULT_RUN_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub tool_server: ToolServerConfig,
    pub dispatch: DispatchConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let settings: HashMap<String, String> = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self::from_settings(&settings)
    }

    pub fn from_settings(settings: &HashMap<String, String>) -> Self {
        Self {
            llm: build_llm_config(settings),
            tool_server: ToolServerConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

fn build_llm_config(settings: &HashMap<String, String>) -> LlmConfig {
    LlmConfig {
        base_url: settings
            .get("OPENAI_BASE_URL")
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        model: settings
            .get("GHQUERY_MODEL")
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| "gpt-4o".to_string()),
        temperature: settings
            .get("GHQUERY_TEMPERATURE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.2),
        max_tokens: settings
            .get("GHQUERY_MAX_TOKENS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(4000),
        extra_headers: settings
            .get("GHQUERY_EXTRA_HEADERS")
            .and_then(|s| serde_json::from_str::<Value>(s).ok())
            .filter(Value::is_object)
            .unwrap_or_else(|| json!({})),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_settings(&HashMap::new());
        assert_eq!(config.llm.base_url, "https://api.openai.com/v1");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.max_tokens, 4000);
        assert_eq!(config.llm.extra_headers, json!({}));
        assert_eq!(config.dispatch.run_timeout, Duration::from_secs(120));
        assert_eq!(config.tool_server.toolsets, "repos,issues,pull_requests");
    }

    #[test]
    fn test_overrides() {
        let settings: HashMap<String, String> = [
            ("OPENAI_BASE_URL", "http://localhost:8080/v1"),
            ("GHQUERY_MODEL", "gpt-4o-mini"),
            ("GHQUERY_TEMPERATURE", "0.7"),
            ("GHQUERY_MAX_TOKENS", "not-a-number"),
            ("GHQUERY_EXTRA_HEADERS", r#"{"X-Org":"acme"}"#),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = AppConfig::from_settings(&settings);
        assert_eq!(config.llm.base_url, "http://localhost:8080/v1");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert!((config.llm.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.llm.max_tokens, 4000);
        assert_eq!(config.llm.extra_headers, json!({"X-Org": "acme"}));
    }

    #[test]
    fn test_extra_headers_must_be_object() {
        let settings: HashMap<String, String> =
            [("GHQUERY_EXTRA_HEADERS".to_string(), "[1,2]".to_string())]
                .into_iter()
                .collect();
        let config = AppConfig::from_settings(&settings);
        assert_eq!(config.llm.extra_headers, json!({}));
    }
}
