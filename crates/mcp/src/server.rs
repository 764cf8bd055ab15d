//! A session with one spawned MCP server.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, Incoming, InitializeParams, InitializeResult, ListToolsResult,
    Outgoing, RequestId, Tool,
};

/// Default timeout for MCP operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum output size (1MB).
/// Sized for large tool outputs (file reads, search results).
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// How long a server gets to exit on its own after stdin closes.
const EXIT_GRACE: Duration = Duration::from_millis(500);

/// Provider messages that mean the tool cannot run in the server's
/// environment, paired with what the caller can do about it.
const RUNTIME_LIMITATIONS: &[(&str, &str)] = &[
    (
        "No module named",
        "a module it imports is missing from the server's environment; install it there or use a different tool",
    ),
    (
        "ModuleNotFoundError",
        "a module it imports is missing from the server's environment; install it there or use a different tool",
    ),
    (
        "only available on macOS",
        "it only runs on macOS; use a cross-platform tool instead",
    ),
    (
        "not installed",
        "a library it needs is not installed for the server; install it or use a different tool",
    ),
    (
        "event loop is already running",
        "it needs a runtime the server does not provide; run it from a standalone server or use a different tool",
    ),
    (
        "Cannot execute MCP tools in async context",
        "it needs a runtime the server does not provide; run it from a standalone server or use a different tool",
    ),
];

/// The stdin/stdout pair of a server. Held for a whole request/response
/// exchange so only one call is in flight per server.
struct Pipes {
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    // Bytes of a line whose read was interrupted by a timeout.
    pending: Vec<u8>,
}

impl Pipes {
    async fn send(&mut self, line: &str) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or(Error::ServerExited)?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn next_line(&mut self) -> Result<Vec<u8>> {
        loop {
            let read = self.stdout.read_until(b'\n', &mut self.pending).await?;
            if self.pending.len() > MAX_OUTPUT_SIZE {
                let size = self.pending.len();
                self.pending.clear();
                return Err(Error::OutputTooLarge {
                    size,
                    max: MAX_OUTPUT_SIZE,
                });
            }
            if read == 0 {
                self.pending.clear();
                return Err(Error::ServerExited);
            }
            if self.pending.ends_with(b"\n") {
                return Ok(std::mem::take(&mut self.pending));
            }
        }
    }

    /// Read until the response for `id` shows up, skipping notifications,
    /// stale responses and anything that is not JSON-RPC.
    async fn receive(&mut self, id: &RequestId) -> Result<Incoming> {
        loop {
            let line = self.next_line().await?;
            let trimmed = line.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_slice::<Incoming>(trimmed) {
                Ok(message) if message.answers(id) => return Ok(message),
                Ok(message) => {
                    debug!(method = ?message.method, id = ?message.id, "skipping unrelated message");
                }
                Err(e) => {
                    debug!(error = %e, "skipping non JSON-RPC output");
                }
            }
        }
    }
}

/// Handle to a running MCP server.
pub struct Server {
    config: ServerConfig,
    process: Mutex<Child>,
    pipes: Mutex<Pipes>,
    next_id: AtomicI64,
    initialized: AtomicBool,
    timeout: Duration,
}

impl Server {
    /// Spawn a new MCP server process.
    pub async fn spawn(config: ServerConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        if let Some(script) = &config.script {
            cmd.arg(script);
        }
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        let mut process = cmd.spawn()?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdin")))?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdout")))?;

        info!(server = %config.name, pid = ?process.id(), "spawned server");

        Ok(Self {
            config,
            process: Mutex::new(process),
            pipes: Mutex::new(Pipes {
                stdin: Some(stdin),
                stdout: BufReader::new(stdout),
                pending: Vec::new(),
            }),
            next_id: AtomicI64::new(1),
            initialized: AtomicBool::new(false),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Perform the handshake. Must succeed before tools can be listed or called.
    pub async fn initialize(&self) -> Result<InitializeResult> {
        let result: InitializeResult = self
            .request("initialize", Some(InitializeParams::default()))
            .await?;

        self.notify("notifications/initialized").await?;

        self.initialized.store(true, Ordering::Release);

        debug!(
            server = %self.config.name,
            protocol = %result.protocol_version,
            remote = %result.server_info.name,
            "handshake complete"
        );
        Ok(result)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Fetch the tools the server currently advertises.
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        self.ensure_initialized()?;

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
            let page: ListToolsResult = self.request("tools/list", params).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    /// Call a tool and return its text output.
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<String> {
        self.ensure_initialized()?;

        let params = CallToolParams { name, arguments };

        let result: CallToolResult = match self.request("tools/call", Some(params)).await {
            Ok(result) => result,
            Err(Error::Rpc(e)) if !e.is_protocol_level() => {
                return Err(classify_failure(name, e.message));
            }
            Err(e) => return Err(e),
        };

        if result.is_error {
            return Err(classify_failure(name, result.text()));
        }

        Ok(result.text())
    }

    /// Shut the server down: close stdin, give it a moment to exit, then kill it.
    pub async fn shutdown(&self) -> Result<()> {
        let _ = self.notify("shutdown").await;
        self.pipes.lock().await.stdin.take();
        self.initialized.store(false, Ordering::Release);

        let mut process = self.process.lock().await;
        if let Ok(Ok(status)) = timeout(EXIT_GRACE, process.wait()).await {
            debug!(server = %self.config.name, %status, "server exited");
            return Ok(());
        }
        process.kill().await?;
        debug!(server = %self.config.name, "server killed");
        Ok(())
    }

    // --- Internal methods ---

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let id = self.next_request_id();
        let params = params.map(serde_json::to_value).transpose()?;
        let line = serde_json::to_string(&Outgoing::request(id.clone(), method, params))?;

        let response = {
            let mut pipes = self.pipes.lock().await;
            pipes.send(&line).await?;
            timeout(self.timeout, pipes.receive(&id))
                .await
                .map_err(|_| Error::Timeout(self.timeout))??
        };

        let value = response.into_result()?;
        serde_json::from_value(value)
            .map_err(|e| Error::InvalidResponse(format!("{method}: {e}")))
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let line = serde_json::to_string(&Outgoing::notification(method, None))?;
        self.pipes.lock().await.send(&line).await
    }
}

/// Turn a provider-reported failure into an error, recognising failures that
/// come from the server's environment rather than from the call itself.
fn classify_failure(tool: &str, message: String) -> Error {
    if message.starts_with("Unknown tool") {
        return Error::ToolNotFound(tool.to_string());
    }
    for (needle, advice) in RUNTIME_LIMITATIONS {
        if message.contains(needle) {
            return Error::Unsupported {
                tool: tool.to_string(),
                reason: format!("{advice} (server said: {})", message.trim()),
            };
        }
    }
    Error::ToolCallFailed(message)
}
