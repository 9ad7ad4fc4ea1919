//! In-memory scripted MCP server for tests.
//!
//! [`ScriptedServer`] holds canned tools, resources and per-tool behaviour.
//! [`ScriptedConnector`] hands out transports that answer JSON-RPC from that
//! script without spawning anything, and counts what happened.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::descriptor::ConnectionSpec;
use crate::error::TransportError;
use crate::protocol::{
    CallToolResult, JsonRpcError, JsonRpcResponse, McpResource, McpToolDefinition,
    MCP_PROTOCOL_VERSION,
};
use crate::transport::{Connector, Transport};

/// How a scripted tool answers `tools/call`.
#[derive(Debug, Clone)]
pub enum ToolBehavior {
    /// Successful text result.
    Text(String),
    /// Result with `isError: true`.
    ToolError(String),
    /// JSON-RPC error response.
    RpcError { code: i32, message: String },
    /// Never answer.
    Hang,
    /// Close the connection instead of answering, then behave as `then`.
    DropOnce { then: Box<ToolBehavior> },
}

/// A call the server received.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub tool: String,
    pub arguments: Value,
}

#[derive(Debug, Default)]
struct Script {
    tools: Vec<McpToolDefinition>,
    resources: Vec<McpResource>,
    behaviors: HashMap<String, ToolBehavior>,
    resources_unsupported: bool,
    hang_on_initialize: bool,
    interleave_notifications: bool,
    remaining_connect_failures: usize,
    refuse_connections: bool,
    connect_delay: Option<Duration>,
    connect_attempts: usize,
    open_connections: usize,
    list_tools_calls: usize,
    calls: Vec<RecordedCall>,
}

/// Shared, cloneable script for an in-memory server.
#[derive(Debug, Clone, Default)]
pub struct ScriptedServer {
    script: Arc<Mutex<Script>>,
}

impl ScriptedServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a tool with a permissive object schema.
    #[must_use]
    pub fn with_tool(self, name: &str, description: &str) -> Self {
        self.with_tool_schema(name, description, json!({"type": "object", "properties": {}}))
    }

    #[must_use]
    pub fn with_tool_schema(self, name: &str, description: &str, schema: Value) -> Self {
        self.script().tools.push(McpToolDefinition {
            name: name.to_string(),
            description: Some(description.to_string()),
            input_schema: schema,
        });
        self
    }

    #[must_use]
    pub fn with_resource(self, name: &str, uri: &str) -> Self {
        self.script().resources.push(McpResource {
            uri: uri.to_string(),
            name: name.to_string(),
            description: None,
            mime_type: None,
        });
        self
    }

    #[must_use]
    pub fn behave(self, tool: &str, behavior: ToolBehavior) -> Self {
        self.script().behaviors.insert(tool.to_string(), behavior);
        self
    }

    #[must_use]
    pub fn respond(self, tool: &str, text: &str) -> Self {
        self.behave(tool, ToolBehavior::Text(text.to_string()))
    }

    #[must_use]
    pub fn respond_tool_error(self, tool: &str, text: &str) -> Self {
        self.behave(tool, ToolBehavior::ToolError(text.to_string()))
    }

    #[must_use]
    pub fn respond_rpc_error(self, tool: &str, code: i32, message: &str) -> Self {
        self.behave(
            tool,
            ToolBehavior::RpcError {
                code,
                message: message.to_string(),
            },
        )
    }

    #[must_use]
    pub fn hang(self, tool: &str) -> Self {
        self.behave(tool, ToolBehavior::Hang)
    }

    /// Drop the connection on the first call to `tool`, answer normally after.
    #[must_use]
    pub fn drop_connection_once(self, tool: &str) -> Self {
        let then = self
            .script()
            .behaviors
            .get(tool)
            .cloned()
            .unwrap_or_else(|| ToolBehavior::Text(format!("{} ok", tool)));
        self.behave(tool, ToolBehavior::DropOnce { then: Box::new(then) })
    }

    /// Answer `resources/list` with "method not found".
    #[must_use]
    pub fn without_resources(self) -> Self {
        self.script().resources_unsupported = true;
        self
    }

    #[must_use]
    pub fn hang_on_initialize(self) -> Self {
        self.script().hang_on_initialize = true;
        self
    }

    /// Precede every response with a log notification.
    #[must_use]
    pub fn with_interleaved_notifications(self) -> Self {
        self.script().interleave_notifications = true;
        self
    }

    /// Fail the next `n` connection attempts.
    #[must_use]
    pub fn fail_connects(self, n: usize) -> Self {
        self.script().remaining_connect_failures = n;
        self
    }

    /// Take `delay` to come up on every connection attempt.
    #[must_use]
    pub fn slow_start(self, delay: Duration) -> Self {
        self.script().connect_delay = Some(delay);
        self
    }

    /// Fail every connection attempt.
    #[must_use]
    pub fn refuse_connections(self) -> Self {
        self.script().refuse_connections = true;
        self
    }

    pub fn connect_attempts(&self) -> usize {
        self.script().connect_attempts
    }

    /// Connections currently open (not yet closed or dropped).
    pub fn open_connections(&self) -> usize {
        self.script().open_connections
    }

    pub fn list_tools_calls(&self) -> usize {
        self.script().list_tools_calls
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.script().calls.clone()
    }

    /// Names of the tools called, in order.
    pub fn call_names(&self) -> Vec<String> {
        self.script().calls.iter().map(|c| c.tool.clone()).collect()
    }

    pub fn connector(&self) -> ScriptedConnector {
        ScriptedConnector::new(self.clone())
    }
}

/// What the transport should do after handling one request.
enum Reply {
    Send(String),
    Hang,
    Drop,
}

impl ScriptedServer {
    fn handle(&self, request: &Value) -> Option<Reply> {
        let id = request.get("id")?.as_i64()?;
        let method = request.get("method").and_then(Value::as_str).unwrap_or_default();
        let mut script = self.script();

        let response = match method {
            "initialize" => {
                if script.hang_on_initialize {
                    return Some(Reply::Hang);
                }
                ok(id, json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {"tools": {}, "resources": {}},
                    "serverInfo": {"name": "scripted", "version": "0.0.0"}
                }))
            }
            "tools/list" => {
                script.list_tools_calls += 1;
                ok(id, json!({"tools": script.tools}))
            }
            "resources/list" if script.resources_unsupported => {
                fail(id, JsonRpcError::METHOD_NOT_FOUND, "Method not found")
            }
            "resources/list" => ok(id, json!({"resources": script.resources})),
            "tools/call" => {
                let params = request.get("params").cloned().unwrap_or_default();
                let tool = params
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let arguments = params.get("arguments").cloned().unwrap_or_default();
                script.calls.push(RecordedCall {
                    tool: tool.clone(),
                    arguments,
                });

                if !script.tools.iter().any(|t| t.name == tool) {
                    fail(id, JsonRpcError::INVALID_PARAMS, &format!("Unknown tool: {}", tool))
                } else {
                    let behavior = script
                        .behaviors
                        .get(&tool)
                        .cloned()
                        .unwrap_or_else(|| ToolBehavior::Text(format!("{} ok", tool)));
                    match behavior {
                        ToolBehavior::Text(text) => result(id, CallToolResult::text(text)),
                        ToolBehavior::ToolError(text) => result(id, CallToolResult::error(text)),
                        ToolBehavior::RpcError { code, message } => fail(id, code, &message),
                        ToolBehavior::Hang => return Some(Reply::Hang),
                        ToolBehavior::DropOnce { then } => {
                            script.behaviors.insert(tool, *then);
                            return Some(Reply::Drop);
                        }
                    }
                }
            }
            _ => fail(id, JsonRpcError::METHOD_NOT_FOUND, "Method not found"),
        };

        Some(Reply::Send(response))
    }
}

fn ok(id: i64, value: Value) -> String {
    serde_json::to_string(&JsonRpcResponse::success(id, value)).unwrap_or_default()
}

fn result(id: i64, value: CallToolResult) -> String {
    serde_json::to_string(&JsonRpcResponse::success(id, value)).unwrap_or_default()
}

fn fail(id: i64, code: i32, message: &str) -> String {
    serde_json::to_string(&JsonRpcResponse::<Value>::failure(id, code, message)).unwrap_or_default()
}

/// Connector backed by a [`ScriptedServer`].
#[derive(Debug, Clone)]
pub struct ScriptedConnector {
    server: ScriptedServer,
}

impl ScriptedConnector {
    pub fn new(server: ScriptedServer) -> Self {
        Self { server }
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _spec: &ConnectionSpec) -> Result<Box<dyn Transport>, TransportError> {
        let delay = self.server.script().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.server.script();
        script.connect_attempts += 1;
        if script.refuse_connections || script.remaining_connect_failures > 0 {
            script.remaining_connect_failures = script.remaining_connect_failures.saturating_sub(1);
            return Err(TransportError::SpawnFailed(std::io::Error::other(
                "scripted connection refused",
            )));
        }
        script.open_connections += 1;
        drop(script);

        Ok(Box::new(ScriptedTransport {
            server: self.server.clone(),
            outbox: VecDeque::new(),
            connected: true,
        }))
    }
}

/// Connector that picks a [`ScriptedServer`] by the launch command, so one
/// caller can reach several scripted servers.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRouter {
    routes: HashMap<String, ScriptedServer>,
}

impl ScriptedRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer connections whose command is `command` from `server`.
    pub fn route(mut self, command: &str, server: &ScriptedServer) -> Self {
        self.routes.insert(command.to_string(), server.clone());
        self
    }
}

#[async_trait]
impl Connector for ScriptedRouter {
    async fn connect(&self, spec: &ConnectionSpec) -> Result<Box<dyn Transport>, TransportError> {
        match self.routes.get(&spec.command) {
            Some(server) => ScriptedConnector::new(server.clone()).connect(spec).await,
            None => Err(TransportError::SpawnFailed(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no scripted server for '{}'", spec.command),
            ))),
        }
    }
}

struct ScriptedTransport {
    server: ScriptedServer,
    outbox: VecDeque<String>,
    connected: bool,
}

impl ScriptedTransport {
    fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            let mut script = self.server.script();
            script.open_connections = script.open_connections.saturating_sub(1);
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let request: Value = serde_json::from_str(message).map_err(|e| {
            TransportError::WriteError(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;

        match self.server.handle(&request) {
            Some(Reply::Send(response)) => {
                if self.server.script().interleave_notifications {
                    self.outbox.push_back(
                        json!({
                            "jsonrpc": "2.0",
                            "method": "notifications/message",
                            "params": {"level": "info", "data": "working"}
                        })
                        .to_string(),
                    );
                }
                self.outbox.push_back(response);
            }
            Some(Reply::Drop) => self.disconnect(),
            Some(Reply::Hang) | None => {}
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<String, TransportError> {
        if let Some(message) = self.outbox.pop_front() {
            return Ok(message);
        }
        if !self.connected {
            return Err(TransportError::ConnectionClosed);
        }
        // Nothing queued: a real server would keep us waiting.
        std::future::pending::<()>().await;
        Err(TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.disconnect();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Drop for ScriptedTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn spec() -> ConnectionSpec {
        ConnectionSpec {
            command: "scripted".into(),
            args: vec![],
            env: HashMap::new(),
            quiet: true,
        }
    }

    #[tokio::test]
    async fn test_connector_counts_and_refusals() {
        let server = ScriptedServer::new().fail_connects(1);
        let connector = server.connector();

        assert!(connector.connect(&spec()).await.is_err());
        let mut transport = connector.connect(&spec()).await.unwrap();
        assert_eq!(server.connect_attempts(), 2);
        assert_eq!(server.open_connections(), 1);

        transport.close().await.unwrap();
        assert_eq!(server.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_dropped_transport_is_not_counted_open() {
        let server = ScriptedServer::new();
        {
            let _transport = server.connector().connect(&spec()).await.unwrap();
            assert_eq!(server.open_connections(), 1);
        }
        assert_eq!(server.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_router_dispatches_on_command() {
        let jira = ScriptedServer::new();
        let github = ScriptedServer::new();
        let router = ScriptedRouter::new().route("jira", &jira).route("github", &github);

        let mut github_spec = spec();
        github_spec.command = "github".into();
        let _transport = router.connect(&github_spec).await.unwrap();
        assert_eq!(github.connect_attempts(), 1);
        assert_eq!(jira.connect_attempts(), 0);

        assert!(router.connect(&spec()).await.is_err());
    }

    #[tokio::test]
    async fn test_answers_tools_list() {
        let server = ScriptedServer::new().with_tool("getRepository", "Fetch a repository");
        let mut transport = server.connector().connect(&spec()).await.unwrap();

        transport
            .send(r#"{"jsonrpc":"2.0","id":4,"method":"tools/list"}"#)
            .await
            .unwrap();
        let reply: Value = serde_json::from_str(&transport.receive().await.unwrap()).unwrap();
        assert_eq!(reply["id"], 4);
        assert_eq!(reply["result"]["tools"][0]["name"], "getRepository");
        assert_eq!(server.list_tools_calls(), 1);
    }
}
