//! A single MCP session over one transport.
//!
//! A [`Session`] is exclusively owned by whoever opened it, so every
//! operation takes `&mut self` and no locking is needed.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::descriptor::ConnectionSpec;
use crate::error::McpError;
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, ListResourcesResult, ListToolsResult, McpResource,
    McpToolDefinition, ServerCapabilities,
};
use crate::transport::{Connector, Transport};

/// Connection state for an MCP session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected.
    Disconnected,
    /// Connected but not initialized.
    Connected,
    /// Connection established and initialized.
    Ready,
    /// Connection is being closed.
    Closing,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
            Self::Ready => write!(f, "ready"),
            Self::Closing => write!(f, "closing"),
        }
    }
}

/// The operations adapters and discovery need from a live server.
///
/// Implemented by a raw [`Session`] and by the
/// [`SessionManager`](crate::manager::SessionManager), which adds timeouts
/// and the persistent/ephemeral fallback.
#[async_trait]
pub trait ToolSession: Send {
    async fn list_tools(&mut self) -> Result<Vec<McpToolDefinition>, McpError>;

    async fn list_resources(&mut self) -> Result<Vec<McpResource>, McpError>;

    /// Call a tool. A result with `is_error` set is still `Ok`.
    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<CallToolResult, McpError>;

    /// Whether each request is already time-boxed by the implementation.
    fn bounds_requests(&self) -> bool {
        false
    }
}

/// A connection to a single MCP server.
pub struct Session {
    /// Server name.
    name: String,
    /// Transport for communication.
    transport: Box<dyn Transport>,
    /// Current connection state.
    state: ConnectionState,
    /// Server capabilities after initialization.
    server_capabilities: Option<ServerCapabilities>,
    /// Next request ID.
    next_id: i64,
}

impl Session {
    /// Wrap a connected transport. Call [`Session::initialize`] before use.
    pub fn new(name: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            transport,
            state: ConnectionState::Connected,
            server_capabilities: None,
            next_id: 1,
        }
    }

    /// Connect and complete the handshake within `handshake_timeout`.
    ///
    /// On timeout the half-open transport is dropped, which kills the child.
    pub async fn open(
        name: &str,
        connector: &dyn Connector,
        spec: &ConnectionSpec,
        handshake_timeout: Duration,
    ) -> Result<Self, McpError> {
        let handshake = async {
            let transport = connector.connect(spec).await?;
            let mut session = Session::new(name, transport);
            if let Err(e) = session.initialize().await {
                if let Err(close_err) = session.close().await {
                    debug!(server = %name, error = %close_err, "Failed to close session after handshake error");
                }
                return Err(e);
            }
            Ok(session)
        };

        tokio::time::timeout(handshake_timeout, handshake)
            .await
            .map_err(|_| McpError::timeout("initialize", handshake_timeout))?
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if the session is ready for use.
    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready && self.transport.is_connected()
    }

    /// Get the server capabilities.
    pub fn capabilities(&self) -> Option<&ServerCapabilities> {
        self.server_capabilities.as_ref()
    }

    fn next_request_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn ensure_ready(&self) -> Result<(), McpError> {
        if self.state != ConnectionState::Ready {
            return Err(McpError::invalid_state("ready", self.state.to_string()));
        }
        Ok(())
    }

    /// Send a request and wait for the response with the matching id.
    ///
    /// Notifications, blank lines and responses to other ids are skipped.
    async fn request<P, R>(&mut self, method: &str, params: Option<P>) -> Result<R, McpError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_request_id();
        let request = JsonRpcRequest::new(id, method, params);
        let request_json = serde_json::to_string(&request)?;

        self.transport.send(&request_json).await?;

        loop {
            let line = self.transport.receive().await?;
            if line.trim().is_empty() {
                continue;
            }

            let message: Value = match serde_json::from_str(&line) {
                Ok(message) => message,
                Err(e) => {
                    debug!(server = %self.name, error = %e, "Skipping non-JSON line");
                    continue;
                }
            };

            if message.get("method").is_some() {
                debug!(server = %self.name, method = ?message.get("method"), "Skipping server message");
                continue;
            }

            if message.get("id").and_then(Value::as_i64) != Some(id) {
                debug!(server = %self.name, expected = id, "Skipping response for another request");
                continue;
            }

            let response: JsonRpcResponse<R> = serde_json::from_value(message)
                .map_err(|e| McpError::protocol(format!("Failed to parse {} response: {}", method, e)))?;

            if let Some(error) = response.error {
                return Err(McpError::server_error(error.code, error.message));
            }

            return response
                .result
                .ok_or_else(|| McpError::protocol(format!("{} response missing result", method)));
        }
    }

    /// Send a notification (no response expected).
    async fn notify<P>(&mut self, method: &str, params: Option<P>) -> Result<(), McpError>
    where
        P: Serialize,
    {
        let notification = JsonRpcNotification::new(method, params);
        let notification_json = serde_json::to_string(&notification)?;
        self.transport.send(&notification_json).await?;
        Ok(())
    }

    /// Run the `initialize` handshake.
    pub async fn initialize(&mut self) -> Result<(), McpError> {
        if self.state != ConnectionState::Connected {
            return Err(McpError::invalid_state("connected", self.state.to_string()));
        }

        debug!(server = %self.name, "Initializing MCP session");

        let result: InitializeResult = self
            .request("initialize", Some(InitializeParams::default()))
            .await
            .map_err(|e| match e {
                McpError::ServerError { code, message } => {
                    McpError::init_failed(format!("server rejected initialize ({}): {}", code, message))
                }
                other => other,
            })?;

        self.server_capabilities = Some(result.capabilities);

        self.notify::<()>("notifications/initialized", None).await?;

        self.state = ConnectionState::Ready;

        info!(
            server = %self.name,
            server_name = %result.server_info.name,
            protocol_version = %result.protocol_version,
            "MCP session initialized"
        );

        Ok(())
    }

    /// Close the session. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<(), McpError> {
        if self.state == ConnectionState::Disconnected {
            return Ok(());
        }

        self.state = ConnectionState::Closing;
        debug!(server = %self.name, "Closing MCP session");

        let result = self.transport.close().await;
        self.state = ConnectionState::Disconnected;
        result?;

        debug!(server = %self.name, "MCP session closed");
        Ok(())
    }
}

#[async_trait]
impl ToolSession for Session {
    async fn list_tools(&mut self) -> Result<Vec<McpToolDefinition>, McpError> {
        self.ensure_ready()?;
        debug!(server = %self.name, "Listing tools");

        let result: ListToolsResult = self.request::<(), _>("tools/list", None).await?;

        debug!(server = %self.name, tool_count = result.tools.len(), "Listed tools");
        Ok(result.tools)
    }

    async fn list_resources(&mut self) -> Result<Vec<McpResource>, McpError> {
        self.ensure_ready()?;
        debug!(server = %self.name, "Listing resources");

        let result: ListResourcesResult = self.request::<(), _>("resources/list", None).await?;
        Ok(result.resources)
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        self.ensure_ready()?;
        debug!(server = %self.name, tool = name, "Calling tool");

        let params = CallToolParams {
            name: name.to_string(),
            arguments: Some(arguments),
        };

        let result: CallToolResult = self.request("tools/call", Some(params)).await?;

        if result.is_error {
            warn!(server = %self.name, tool = name, "Tool returned error");
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedConnector, ScriptedServer};
    use std::collections::HashMap;

    fn spec() -> ConnectionSpec {
        ConnectionSpec {
            command: "scripted".to_string(),
            args: Vec::new(),
            env: HashMap::new(),
            quiet: true,
        }
    }

    async fn open(server: &ScriptedServer) -> Session {
        let connector = ScriptedConnector::new(server.clone());
        Session::open("jira", &connector, &spec(), Duration::from_secs(1))
            .await
            .unwrap()
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Ready.to_string(), "ready");
        assert_eq!(ConnectionState::Closing.to_string(), "closing");
    }

    #[tokio::test]
    async fn test_open_list_and_call() {
        let server = ScriptedServer::new()
            .with_tool("getJiraIssue", "Fetch one issue")
            .respond("getJiraIssue", "Issue KAN-7: Fix login");
        let mut session = open(&server).await;
        assert!(session.is_ready());

        let tools = session.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);

        let result = session
            .call_tool("getJiraIssue", serde_json::json!({"issueIdOrKey": "KAN-7"}))
            .await
            .unwrap();
        assert_eq!(result.joined_text(), "Issue KAN-7: Fix login");

        session.close().await.unwrap();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_interleaved_notifications_are_skipped() {
        let server = ScriptedServer::new()
            .with_tool("getJiraIssue", "Fetch one issue")
            .with_interleaved_notifications();
        let mut session = open(&server).await;
        let tools = session.list_tools().await.unwrap();
        assert_eq!(tools[0].name, "getJiraIssue");
    }

    #[tokio::test]
    async fn test_rpc_error_is_server_error() {
        let server = ScriptedServer::new().with_tool("getJiraIssue", "Fetch one issue");
        let mut session = open(&server).await;
        let err = session
            .call_tool("noSuchTool", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ServerError { .. }));
        assert!(!err.poisons_session());
    }

    #[tokio::test]
    async fn test_open_times_out() {
        let server = ScriptedServer::new().hang_on_initialize();
        let connector = ScriptedConnector::new(server);
        let err = Session::open("jira", &connector, &spec(), Duration::from_millis(20))
            .await
            .err()
            .unwrap();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_calls_before_initialize_are_rejected() {
        let server = ScriptedServer::new();
        let transport = ScriptedConnector::new(server).connect(&spec()).await.unwrap();
        let mut session = Session::new("jira", transport);
        let err = session.list_tools().await.unwrap_err();
        assert!(matches!(err, McpError::InvalidState { .. }));
    }
}
