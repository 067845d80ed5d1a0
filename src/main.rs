use clap::{Parser, ValueEnum};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use ghquery_lib::commands::{self, QueryForm};
use ghquery_lib::models::redact;
use ghquery_lib::llm::OpenAiProvider;
use ghquery_lib::tool_server::{SessionOptions, StdioLauncher};
use ghquery_lib::{AppConfig, CredentialStore, Dispatcher, QueryCategory};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum QueryType {
    Issues,
    PullRequests,
    RepositoryActivity,
    Custom,
}

impl From<QueryType> for QueryCategory {
    fn from(value: QueryType) -> Self {
        match value {
            QueryType::Issues => QueryCategory::Issues,
            QueryType::PullRequests => QueryCategory::PullRequests,
            QueryType::RepositoryActivity => QueryCategory::RepositoryActivity,
            QueryType::Custom => QueryCategory::Custom,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "ghquery",
    about = "Explore GitHub repositories in natural language through the GitHub MCP server"
)]
struct Cli {
    /// OpenAI API key (overrides OPENAI_API_KEY)
    #[arg(long)]
    openai_key: Option<String>,

    /// GitHub token (overrides GITHUB_TOKEN; create a fine-grained token at github.com/settings/tokens)
    #[arg(long)]
    github_token: Option<String>,

    /// Repository to explore (owner/repo)
    #[arg(long, default_value = "munzahmed07/Edge-Adaptive-Trajectory")]
    repo: String,

    /// Query template to start from
    #[arg(long, value_enum, default_value_t = QueryType::Issues)]
    query_type: QueryType,

    /// Your query; replaces the template
    #[arg(long)]
    query: Option<String>,

    /// Chat model (overrides GHQUERY_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Chat completions base URL (overrides OPENAI_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Time budget for the agent, in seconds
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl fmt::Debug for Cli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cli")
            .field("openai_key", &self.openai_key.as_deref().map(redact))
            .field("github_token", &self.github_token.as_deref().map(redact))
            .field("repo", &self.repo)
            .field("query_type", &self.query_type)
            .field("query", &self.query)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("log_json", &self.log_json)
            .finish()
    }
}

/// Environment first, flags on top.
fn credential_store(cli: &Cli) -> CredentialStore {
    let mut store = CredentialStore::from_env();
    if let Some(key) = cli.openai_key.clone() {
        store.set_model_key(key);
    }
    if let Some(token) = cli.github_token.clone() {
        store.set_source_token(token);
    }
    store
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = AppConfig::from_env();
    if let Some(model) = cli.model.clone() {
        config.llm.model = model;
    }
    if let Some(base_url) = cli.base_url.clone() {
        config.llm.base_url = base_url;
    }
    config.dispatch.run_timeout = Duration::from_secs(cli.timeout_secs);

    tracing::debug!(?cli, "parsed arguments");
    let store = credential_store(&cli);

    let form = QueryForm {
        repository: cli.repo.clone(),
        category: cli.query_type.into(),
        query: cli.query.clone(),
    };

    let launcher = StdioLauncher::new(SessionOptions {
        handshake_timeout: config.dispatch.handshake_timeout,
        ..SessionOptions::default()
    });
    let dispatcher = Dispatcher::new(
        Arc::new(launcher),
        Arc::new(OpenAiProvider::new(config.llm.clone())),
        config.tool_server.clone(),
        config.dispatch,
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    eprintln!("Analyzing GitHub repository {}...", form.repository);
    let report = match commands::run_query(&dispatcher, &store, &form, &cancel).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    println!("{}", commands::render_report(&report));
    if !report.result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
