//! Ask questions about a GitHub repository in natural language.
//!
//! A run starts the GitHub MCP server as a child process, hands its tools to
//! a chat-completions agent and returns the agent's markdown answer, bounded
//! by a time budget.

pub mod agent;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod llm;
pub mod models;
pub mod tool_server;

pub use config::AppConfig;
pub use credentials::CredentialStore;
pub use dispatcher::Dispatcher;
pub use models::{Credentials, FailureReason, QueryCategory, QueryRequest, RunReport, RunResult};
