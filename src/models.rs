use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type ID = String;

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub model_provider_key: String,
    pub source_control_token: String,
}

impl Credentials {
    pub fn new(model_provider_key: impl Into<String>, source_control_token: impl Into<String>) -> Self {
        Self {
            model_provider_key: model_provider_key.into(),
            source_control_token: source_control_token.into(),
        }
    }

    pub fn has_model_key(&self) -> bool {
        !self.model_provider_key.is_empty()
    }

    pub fn has_source_token(&self) -> bool {
        !self.source_control_token.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("model_provider_key", &redact(&self.model_provider_key))
            .field("source_control_token", &redact(&self.source_control_token))
            .finish()
    }
}

/// Stand-in for a secret in debug output.
pub fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub repository: String, // owner/name
    pub message: String,
}

impl QueryRequest {
    pub fn new(repository: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            message: message.into(),
        }
    }
}

/// Preset question families offered by the front-end. Each maps to a template
/// message; `Custom` leaves the message to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryCategory {
    #[default]
    Issues,
    PullRequests,
    RepositoryActivity,
    Custom,
}

impl QueryCategory {
    pub fn template(self, repository: &str) -> String {
        match self {
            QueryCategory::Issues => format!("Show open issues in {}", repository),
            QueryCategory::PullRequests => {
                format!("Show recent merged pull requests in {}", repository)
            }
            QueryCategory::RepositoryActivity => {
                format!("Analyze repository activity and health for {}", repository)
            }
            QueryCategory::Custom => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    MissingKey,
    MissingToken,
    Timeout,
    Error(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::MissingKey => write!(f, "OpenAI API key not provided."),
            FailureReason::MissingToken => write!(f, "GitHub token not provided."),
            FailureReason::Timeout => write!(f, "Request timed out."),
            FailureReason::Error(detail) => write!(f, "Error: {}", detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RunResult {
    Success(String),
    Failure(FailureReason),
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RunResult::Success(_))
    }

    /// Markdown shown to the user: the answer itself, or `❌ <reason>`.
    pub fn render(&self) -> String {
        match self {
            RunResult::Success(text) => text.clone(),
            RunResult::Failure(reason) => format!("❌ {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DispatchState {
    Idle,
    ValidatingCredentials,
    LaunchingSession,
    Delegating,
    Succeeded,
    Failed(FailureReason),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToolCallRow {
    pub id: ID,
    pub run_id: ID,
    pub name: String,
    pub args_json: String,
    pub result_json: String,
    pub is_error: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: ID,
    pub result: RunResult,
    pub trace: Vec<DispatchState>,
    pub tool_calls: Vec<ToolCallRow>,
}

impl RunReport {
    pub fn visited(&self, state: &DispatchState) -> bool {
        self.trace.iter().any(|s| s == state)
    }
}

pub fn new_id() -> ID {
    Uuid::new_v4().to_string()
}

pub fn now_iso() -> String {
    let t = time::OffsetDateTime::now_utc();
    t.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_templates() {
        assert_eq!(
            QueryCategory::Issues.template("octo/repo"),
            "Show open issues in octo/repo"
        );
        assert_eq!(
            QueryCategory::PullRequests.template("octo/repo"),
            "Show recent merged pull requests in octo/repo"
        );
        assert_eq!(
            QueryCategory::RepositoryActivity.template("octo/repo"),
            "Analyze repository activity and health for octo/repo"
        );
        assert_eq!(QueryCategory::Custom.template("octo/repo"), "");
    }

    #[test]
    fn test_render_failures() {
        assert_eq!(
            RunResult::Failure(FailureReason::MissingKey).render(),
            "❌ OpenAI API key not provided."
        );
        assert_eq!(
            RunResult::Failure(FailureReason::MissingToken).render(),
            "❌ GitHub token not provided."
        );
        assert_eq!(
            RunResult::Failure(FailureReason::Timeout).render(),
            "❌ Request timed out."
        );
        assert_eq!(
            RunResult::Failure(FailureReason::Error("boom".into())).render(),
            "❌ Error: boom"
        );
    }

    #[test]
    fn test_render_success_is_verbatim() {
        let result = RunResult::Success("## Issues\n- #1".into());
        assert!(result.is_success());
        assert_eq!(result.render(), "## Issues\n- #1");
    }

    #[test]
    fn test_credentials_presence() {
        let creds = Credentials::new("", "tok");
        assert!(!creds.has_model_key());
        assert!(creds.has_source_token());
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials::new("sk-live-123", "");
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("sk-live-123"), "{}", rendered);
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("<empty>"));
    }
}
