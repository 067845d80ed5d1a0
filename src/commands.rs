use tokio_util::sync::CancellationToken;

use crate::credentials::CredentialStore;
use crate::dispatcher::Dispatcher;
use crate::models::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryForm {
    pub repository: String,
    pub category: QueryCategory,
    /// Free text; falls back to the category template when absent.
    pub query: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FormError {
    #[error("Please enter a query.")]
    EmptyQuery,
}

impl QueryForm {
    pub fn query_text(&self) -> String {
        match &self.query {
            Some(query) => query.clone(),
            None => self.category.template(&self.repository),
        }
    }
}

/// Mentions the repository unless the query already does.
pub fn compose_message(repository: &str, query: &str) -> String {
    if query.contains(repository) {
        query.to_string()
    } else {
        format!("{} in {}", query, repository)
    }
}

pub fn build_request(form: &QueryForm) -> Result<QueryRequest, FormError> {
    let query = form.query_text();
    let query = query.trim();
    if query.is_empty() {
        return Err(FormError::EmptyQuery);
    }
    Ok(QueryRequest::new(
        form.repository.clone(),
        compose_message(&form.repository, query),
    ))
}

pub async fn run_query(
    dispatcher: &Dispatcher,
    store: &CredentialStore,
    form: &QueryForm,
    cancel: &CancellationToken,
) -> Result<RunReport, FormError> {
    // Missing credentials are reported before an empty query.
    let request = match build_request(form) {
        Ok(request) => request,
        Err(_) if !store.has_model_key() || !store.has_source_token() => {
            QueryRequest::new(form.repository.clone(), String::new())
        }
        Err(e) => return Err(e),
    };
    Ok(dispatcher.run(&store.credentials(), &request, cancel).await)
}

pub fn render_report(report: &RunReport) -> String {
    format!("### 📊 Results\n\n{}", report.result.render())
}
