use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::DEFAULT_HANDSHAKE_TIMEOUT;
use crate::tool_server::launcher::LaunchSpec;
use crate::tool_server::protocol::*;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("tool server executable '{0}' not found on PATH")]
    ExecutableNotFound(String),
    #[error("failed to start tool server: {0}")]
    Spawn(String),
    #[error("tool server handshake failed: {0}")]
    Handshake(String),
    #[error("tool server request '{0}' timed out")]
    RequestTimeout(String),
    #[error("tool server error: {0}")]
    Rpc(#[from] RpcError),
    #[error("unexpected tool server reply: {0}")]
    Protocol(String),
    #[error("tool server connection closed")]
    Closed,
    #[error("tool server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Live connection to a tool server. The capability set is fixed at
/// handshake time; `close` consumes the session so it runs at most once.
#[async_trait]
pub trait ToolSession: Send + Sync {
    fn tools(&self) -> &[ToolDescriptor];

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput, SessionError>;

    async fn close(self: Box<Self>) -> Result<(), SessionError>;
}

#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn open(&self, spec: &LaunchSpec) -> Result<Box<dyn ToolSession>, SessionError>;
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub handshake_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Starts the tool server as a child process speaking MCP over stdio.
#[derive(Debug, Clone, Default)]
pub struct StdioLauncher {
    options: SessionOptions,
}

impl StdioLauncher {
    pub fn new(options: SessionOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl SessionLauncher for StdioLauncher {
    async fn open(&self, spec: &LaunchSpec) -> Result<Box<dyn ToolSession>, SessionError> {
        let session = McpSession::connect(spec, self.options).await?;
        Ok(Box::new(session))
    }
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, RpcError>>>>>;
type Writer = Arc<tokio::sync::Mutex<Option<ChildStdin>>>;

pub struct McpSession {
    child: Mutex<Child>,
    writer: Writer,
    pending: Pending,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
    stderr_drain: JoinHandle<()>,
    server_info: ServerInfo,
    tools: Vec<ToolDescriptor>,
    request_timeout: Duration,
}

impl McpSession {
    pub async fn connect(spec: &LaunchSpec, options: SessionOptions) -> Result<Self, SessionError> {
        let program = which::which(&spec.executable)
            .map_err(|_| SessionError::ExecutableNotFound(spec.executable.clone()))?;

        let mut child = Command::new(&program)
            .args(&spec.arguments)
            .envs(&spec.environment)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SessionError::Spawn(format!("{}: {}", spec.executable, e)))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (stdin, stdout, stderr) = match (stdin, stdout, stderr) {
            (Some(i), Some(o), Some(e)) => (i, o, e),
            _ => return Err(SessionError::Spawn("stdio pipes were not captured".to_string())),
        };

        tracing::info!(
            executable = %spec.executable,
            args = ?spec.arguments,
            pid = ?child.id(),
            "tool server started"
        );

        let pending: Pending = Arc::default();
        let writer: Writer = Arc::new(tokio::sync::Mutex::new(Some(stdin)));
        let reader = tokio::spawn(read_loop(stdout, pending.clone(), writer.clone()));
        let stderr_drain = tokio::spawn(drain_stderr(stderr));

        let mut session = Self {
            child: Mutex::new(child),
            writer,
            pending,
            next_id: AtomicU64::new(1),
            reader,
            stderr_drain,
            server_info: ServerInfo::default(),
            tools: Vec::new(),
            request_timeout: options.request_timeout,
        };

        let failure = match timeout(options.handshake_timeout, session.handshake()).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "no response within {}s",
                options.handshake_timeout.as_secs_f32()
            )),
        };

        match failure {
            None => {
                tracing::info!(
                    server = %session.server_info.name,
                    version = %session.server_info.version,
                    tools = session.tools.len(),
                    "tool server ready"
                );
                Ok(session)
            }
            Some(reason) => {
                if let Err(e) = session.shutdown().await {
                    tracing::warn!(error = %e, "failed to stop tool server after handshake failure");
                }
                Err(SessionError::Handshake(reason))
            }
        }
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    pub fn id(&self) -> Option<u32> {
        lock(&self.child).id()
    }

    async fn handshake(&mut self) -> Result<(), SessionError> {
        let init = self.request("initialize", Some(initialize_params())).await?;
        let init: InitializeResult =
            serde_json::from_value(init).map_err(|e| SessionError::Protocol(e.to_string()))?;
        tracing::debug!(protocol = %init.protocol_version, "initialize acknowledged");
        self.server_info = init.server_info;

        self.notify("notifications/initialized").await?;

        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListToolsResult = serde_json::from_value(self.request("tools/list", params).await?)
                .map_err(|e| SessionError::Protocol(e.to_string()))?;
            self.tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(())
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, SessionError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);

        if let Err(e) = write_line(&self.writer, &encode_request(id, method, params)).await {
            lock(&self.pending).remove(&id);
            return Err(e);
        }

        match timeout(self.request_timeout, rx).await {
            Ok(Ok(outcome)) => outcome.map_err(SessionError::from),
            // Reader dropped the sender: the server closed stdout.
            Ok(Err(_)) => Err(SessionError::Closed),
            Err(_) => {
                lock(&self.pending).remove(&id);
                Err(SessionError::RequestTimeout(method.to_string()))
            }
        }
    }

    async fn notify(&self, method: &str) -> Result<(), SessionError> {
        write_line(&self.writer, &encode_notification(method)).await
    }

    async fn shutdown(self) -> Result<(), SessionError> {
        // EOF on stdin is the stdio transport's shutdown signal.
        self.writer.lock().await.take();

        let mut child = self.child.into_inner().unwrap_or_else(PoisonError::into_inner);
        let status = stop_child(&mut child).await;

        self.reader.abort();
        self.stderr_drain.abort();

        let status = status?;
        tracing::info!(%status, "tool server stopped");
        Ok(())
    }
}

#[async_trait]
impl ToolSession for McpSession {
    fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput, SessionError> {
        let result = self
            .request("tools/call", Some(json!({ "name": name, "arguments": arguments })))
            .await?;
        serde_json::from_value(result).map_err(|e| SessionError::Protocol(e.to_string()))
    }

    async fn close(self: Box<Self>) -> Result<(), SessionError> {
        self.shutdown().await
    }
}

async fn stop_child(child: &mut Child) -> std::io::Result<ExitStatus> {
    if let Ok(status) = timeout(SHUTDOWN_GRACE, child.wait()).await {
        return status;
    }
    tracing::debug!("tool server ignored stdin close, killing");
    child.kill().await?;
    child.wait().await
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn write_line(writer: &Writer, line: &str) -> Result<(), SessionError> {
    let mut guard = writer.lock().await;
    let stdin = guard.as_mut().ok_or(SessionError::Closed)?;
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

async fn read_loop(stdout: ChildStdout, pending: Pending, writer: Writer) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "tool server stdout read failed");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_incoming(line) {
            Ok(Incoming::Response { id, outcome }) => {
                let sender = lock(&pending).remove(&id);
                match sender {
                    Some(tx) => {
                        let _ = tx.send(outcome);
                    }
                    None => tracing::debug!(id, "response for unknown request"),
                }
            }
            Ok(Incoming::Request { id, method }) => {
                let reply = if method == "ping" {
                    encode_result(&id, json!({}))
                } else {
                    encode_method_not_found(&id, &method)
                };
                if let Err(e) = write_line(&writer, &reply).await {
                    tracing::debug!(error = %e, %method, "could not answer server request");
                }
            }
            Ok(Incoming::Notification { method }) => {
                tracing::trace!(%method, "server notification");
            }
            Err(e) => tracing::debug!(error = %e, "ignoring non-protocol output"),
        }
    }

    // Dropping the senders fails every outstanding request with `Closed`.
    lock(&pending).clear();
}

async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "ghquery::tool_server::stderr", "{}", line);
    }
}
