//! One end-to-end query: validate credentials, start the tool server, let the
//! agent answer within the time budget, release the server, classify.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::agent::{Agent, AgentError, InstructionProfile};
use crate::config::{DispatchConfig, ToolServerConfig};
use crate::llm::ChatProvider;
use crate::models::*;
use crate::tool_server::{build_launch_spec, LaunchSpec, SessionLauncher, ToolSession};

pub struct Dispatcher {
    launcher: Arc<dyn SessionLauncher>,
    provider: Arc<dyn ChatProvider>,
    tool_server: ToolServerConfig,
    profile: InstructionProfile,
    run_timeout: Duration,
}

enum Delegation {
    Answered(String),
    TimedOut,
    Failed(String),
}

impl Dispatcher {
    pub fn new(
        launcher: Arc<dyn SessionLauncher>,
        provider: Arc<dyn ChatProvider>,
        tool_server: ToolServerConfig,
        dispatch: DispatchConfig,
    ) -> Self {
        Self {
            launcher,
            provider,
            tool_server,
            profile: InstructionProfile::github_assistant(),
            run_timeout: dispatch.run_timeout,
        }
    }

    pub async fn run(
        &self,
        credentials: &Credentials,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> RunReport {
        let run_id = new_id();
        let span = tracing::info_span!("run", run_id = %run_id, repo = %request.repository);
        let mut report = RunReport {
            run_id,
            result: RunResult::Failure(FailureReason::Error("run not started".to_string())),
            trace: vec![DispatchState::Idle],
            tool_calls: Vec::new(),
        };

        let result = self
            .execute(credentials, request, cancel, &mut report)
            .instrument(span)
            .await;

        let terminal = match &result {
            RunResult::Success(_) => DispatchState::Succeeded,
            RunResult::Failure(reason) => DispatchState::Failed(reason.clone()),
        };
        transition(&mut report.trace, terminal);
        report.result = result;
        report
    }

    async fn execute(
        &self,
        credentials: &Credentials,
        request: &QueryRequest,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> RunResult {
        transition(&mut report.trace, DispatchState::ValidatingCredentials);
        if !credentials.has_model_key() {
            return RunResult::Failure(FailureReason::MissingKey);
        }
        if !credentials.has_source_token() {
            return RunResult::Failure(FailureReason::MissingToken);
        }

        transition(&mut report.trace, DispatchState::LaunchingSession);
        let spec: LaunchSpec = build_launch_spec(credentials, &self.tool_server);
        let session = match self.launcher.open(&spec).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "tool session could not be acquired");
                return RunResult::Failure(FailureReason::Error(e.to_string()));
            }
        };

        let outcome = self
            .delegate(session.as_ref(), credentials, request, cancel, report)
            .await;

        if let Err(e) = session.close().await {
            tracing::warn!(error = %e, "tool session did not shut down cleanly");
        }

        match outcome {
            Delegation::Answered(text) => RunResult::Success(text),
            Delegation::TimedOut => RunResult::Failure(FailureReason::Timeout),
            Delegation::Failed(detail) => RunResult::Failure(FailureReason::Error(detail)),
        }
    }

    async fn delegate(
        &self,
        session: &dyn ToolSession,
        credentials: &Credentials,
        request: &QueryRequest,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> Delegation {
        let backend = match self.provider.backend(&credentials.model_provider_key) {
            Ok(backend) => backend,
            Err(e) => return Delegation::Failed(e.to_string()),
        };

        transition(&mut report.trace, DispatchState::Delegating);
        let agent = Agent::new(
            backend.as_ref(),
            session,
            self.profile.clone(),
            report.run_id.clone(),
        );

        // Child token: the budget can cancel this delegation without touching the caller's token.
        let budget = cancel.child_token();
        let answer = tokio::time::timeout(
            self.run_timeout,
            agent.run(&request.message, &budget, &mut report.tool_calls),
        )
        .await;

        match answer {
            Ok(Ok(text)) => Delegation::Answered(text),
            Ok(Err(AgentError::Cancelled)) => Delegation::Failed("run cancelled".to_string()),
            Ok(Err(e)) => Delegation::Failed(e.to_string()),
            Err(_) => {
                budget.cancel();
                tracing::warn!(timeout_secs = self.run_timeout.as_secs(), "delegation timed out");
                Delegation::TimedOut
            }
        }
    }
}

fn transition(trace: &mut Vec<DispatchState>, next: DispatchState) {
    tracing::debug!(from = ?trace.last(), to = ?next, "dispatch state");
    trace.push(next);
}
