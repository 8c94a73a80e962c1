//! MCP tool provider over a child process's stdin/stdout.
//!
//! Messages are newline-delimited JSON-RPC 2.0. One request is in flight at
//! a time; responses are matched by id and notifications are skipped.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::Result;

use super::{ContentSegment, ToolDefinition, ToolOutput, ToolProvider};

const PROTOCOL_VERSION: &str = "2025-06-18";

/// A live session with the child process
struct McpSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl McpSession {
    async fn send(&mut self, message: &Value) -> Result<()> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn notify(&mut self, method: &str) -> Result<()> {
        self.send(&json!({"jsonrpc": "2.0", "method": method})).await
    }

    /// Send a request and wait for the response with the same id
    async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        self.send(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .await?;

        loop {
            let line = self.stdout.next_line().await?.ok_or_else(|| {
                Error::Connection(format!("MCP server closed the connection during {method}"))
            })?;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let message: Value = match serde_json::from_str(line) {
                Ok(message) => message,
                Err(e) => {
                    debug!("Skipping non-JSON line from MCP server: {}", e);
                    continue;
                }
            };

            // Server-initiated requests and notifications carry a method and
            // use their own id space
            if let Some(server_method) = message.get("method").and_then(Value::as_str) {
                let server_method = server_method.to_string();
                if let Some(server_id) = message.get("id").cloned() {
                    self.answer_server_request(&server_method, server_id).await?;
                } else {
                    debug!("Skipping MCP notification: {}", server_method);
                }
                continue;
            }

            if message.get("id").and_then(Value::as_u64) != Some(id) {
                debug!("Skipping MCP response for another request");
                continue;
            }

            if let Some(error) = message.get("error") {
                let text = error
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string());
                return Err(Error::ToolExecution(format!("{method} failed: {text}")));
            }

            match message.get("result") {
                Some(result) => return Ok(result.clone()),
                None => debug!("Skipping MCP message with neither result nor error"),
            }
        }
    }

    /// Reply to a request the server sent us. Only `ping` is supported.
    async fn answer_server_request(&mut self, method: &str, id: Value) -> Result<()> {
        debug!("Answering MCP server request: {}", method);
        let reply = if method == "ping" {
            json!({"jsonrpc": "2.0", "id": id, "result": {}})
        } else {
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": format!("Method not found: {method}")}
            })
        };
        self.send(&reply).await
    }
}

/// Tool provider backed by an MCP server process
pub struct StdioToolProvider {
    command: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    timeout: Duration,
    session: Option<McpSession>,
}

impl StdioToolProvider {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: Vec::new(),
            timeout: Duration::from_secs(120),
            session: None,
        }
    }

    /// Set an environment variable for the child process
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn session(&mut self) -> Result<&mut McpSession> {
        self.session
            .as_mut()
            .ok_or_else(|| Error::Connection("MCP session is not connected".to_string()))
    }

    async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        let timeout = self.timeout;
        let session = self.session()?;
        let result = match tokio::time::timeout(timeout, session.request(method, params)).await {
            Ok(result) => result,
            Err(_) => Err(Error::ToolExecution(format!(
                "{method} timed out after {}s",
                timeout.as_secs()
            ))),
        };

        // A broken pipe or closed stdout leaves nothing to talk to; drop the
        // session so the next call starts a new server
        if let Err(Error::Connection(_) | Error::Io(_)) = &result {
            warn!("MCP session lost during {}, closing it", method);
            self.session = None;
        }

        result
    }

    async fn handshake(&mut self) -> Result<()> {
        let result = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            )
            .await?;

        let server = result
            .pointer("/serverInfo/name")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!("MCP session initialized with server: {}", server);

        self.session()?.notify("notifications/initialized").await
    }
}

#[async_trait]
impl ToolProvider for StdioToolProvider {
    fn name(&self) -> &str {
        &self.command
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        debug!("Starting MCP server: {} {:?}", self.command, self.args);
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Connection(format!("Failed to start MCP server '{}': {}", self.command, e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Connection("Failed to open MCP stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Connection("Failed to open MCP stdout".to_string()))?;

        self.session = Some(McpSession {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
        });

        if let Err(e) = self.handshake().await {
            self.disconnect().await?;
            return Err(Error::Connection(format!("MCP handshake failed: {e}")));
        }

        Ok(())
    }

    async fn list_tools(&mut self) -> Result<Vec<ToolDefinition>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = match cursor.take() {
                Some(c) => json!({"cursor": c}),
                None => json!({}),
            };
            let result = self.request("tools/list", params).await?;

            for tool in result.get("tools").and_then(Value::as_array).into_iter().flatten() {
                let Some(name) = tool.get("name").and_then(Value::as_str) else {
                    warn!("Skipping MCP tool without a name");
                    continue;
                };
                tools.push(ToolDefinition {
                    name: name.to_string(),
                    description: tool
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    parameters: tool
                        .get("inputSchema")
                        .cloned()
                        .unwrap_or_else(|| json!({"type": "object"})),
                });
            }

            match result.get("nextCursor").and_then(Value::as_str) {
                Some(next) if !next.is_empty() => cursor = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(tools)
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<ToolOutput> {
        let arguments = if arguments.is_null() { json!({}) } else { arguments };
        let result = self
            .request("tools/call", json!({"name": name, "arguments": arguments}))
            .await?;
        Ok(parse_call_result(&result))
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            drop(session.stdin);
            if let Err(e) = session.child.kill().await {
                debug!("MCP server already exited: {}", e);
            }
            info!("MCP session closed");
        }
        Ok(())
    }
}

/// Convert a `tools/call` result into content segments
fn parse_call_result(result: &Value) -> ToolOutput {
    let content = result
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| match (item.get("type").and_then(Value::as_str), item.get("text")) {
                    (Some("text"), Some(Value::String(text))) => ContentSegment::Text(text.clone()),
                    _ => ContentSegment::Other(item.clone()),
                })
                .collect()
        })
        .unwrap_or_else(|| vec![ContentSegment::Other(result.clone())]);

    ToolOutput {
        content,
        is_error: result.get("isError").and_then(Value::as_bool).unwrap_or(false),
    }
}
