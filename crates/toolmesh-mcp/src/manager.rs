//! Per-server session management with persistent-then-ephemeral fallback.
//!
//! The first operation tries to establish a persistent session. If that
//! fails, the manager switches to ephemeral sessions (open, call, close) for
//! the rest of its life. If an established persistent session breaks, it is
//! closed, the operation is retried once on an ephemeral session, and the
//! next operation tries persistence again.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use toolmesh_core::TimeoutsConfig;
use tracing::{debug, info, warn};

use crate::descriptor::ConnectionSpec;
use crate::error::McpError;
use crate::protocol::{CallToolResult, McpResource, McpToolDefinition};
use crate::session::{Session, ToolSession};
use crate::transport::Connector;

/// Observable state of a [`SessionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Uninitialized,
    PersistentActive,
    EphemeralOnly,
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::PersistentActive => write!(f, "persistent"),
            Self::EphemeralOnly => write!(f, "ephemeral"),
        }
    }
}

enum SessionState {
    Uninitialized,
    PersistentActive(Session),
    EphemeralOnly,
}

enum Operation {
    ListTools,
    ListResources,
    CallTool { name: String, arguments: Value },
}

enum Outcome {
    Tools(Vec<McpToolDefinition>),
    Resources(Vec<McpResource>),
    Call(CallToolResult),
}

impl Operation {
    fn method(&self) -> &'static str {
        match self {
            Self::ListTools => "tools/list",
            Self::ListResources => "resources/list",
            Self::CallTool { .. } => "tools/call",
        }
    }

    fn bound(&self, timeouts: &TimeoutsConfig) -> Duration {
        match self {
            Self::ListTools => timeouts.list_tools(),
            Self::ListResources => timeouts.list_resources(),
            Self::CallTool { .. } => timeouts.tool_call(),
        }
    }

    async fn run(&self, session: &mut Session, bound: Duration) -> Result<Outcome, McpError> {
        let work = async {
            match self {
                Self::ListTools => session.list_tools().await.map(Outcome::Tools),
                Self::ListResources => session.list_resources().await.map(Outcome::Resources),
                Self::CallTool { name, arguments } => session
                    .call_tool(name, arguments.clone())
                    .await
                    .map(Outcome::Call),
            }
        };
        tokio::time::timeout(bound, work)
            .await
            .map_err(|_| McpError::timeout(self.method(), bound))?
    }
}

/// Owns the connection to one server on behalf of its adapter.
pub struct SessionManager {
    server: String,
    spec: ConnectionSpec,
    connector: Arc<dyn Connector>,
    timeouts: TimeoutsConfig,
    state: SessionState,
    connections_opened: usize,
}

impl SessionManager {
    pub fn new(
        server: impl Into<String>,
        spec: ConnectionSpec,
        connector: Arc<dyn Connector>,
        timeouts: TimeoutsConfig,
    ) -> Self {
        Self {
            server: server.into(),
            spec,
            connector,
            timeouts,
            state: SessionState::Uninitialized,
            connections_opened: 0,
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn spec(&self) -> &ConnectionSpec {
        &self.spec
    }

    pub fn timeouts(&self) -> &TimeoutsConfig {
        &self.timeouts
    }

    pub fn mode(&self) -> SessionMode {
        match self.state {
            SessionState::Uninitialized => SessionMode::Uninitialized,
            SessionState::PersistentActive(_) => SessionMode::PersistentActive,
            SessionState::EphemeralOnly => SessionMode::EphemeralOnly,
        }
    }

    /// Sessions successfully opened so far, persistent and ephemeral.
    pub fn connections_opened(&self) -> usize {
        self.connections_opened
    }

    /// Open a fresh session that the caller owns and must close.
    pub async fn open_ephemeral(&mut self) -> Result<Session, McpError> {
        let session = Session::open(
            &self.server,
            self.connector.as_ref(),
            &self.spec,
            self.timeouts.handshake(),
        )
        .await?;
        self.connections_opened += 1;
        Ok(session)
    }

    async fn establish(&mut self) -> SessionState {
        match self.open_ephemeral().await {
            Ok(session) => {
                info!(server = %self.server, "Persistent session established");
                SessionState::PersistentActive(session)
            }
            Err(e) => {
                warn!(
                    server = %self.server,
                    error = %e,
                    "Persistent session unavailable, falling back to per-call sessions"
                );
                SessionState::EphemeralOnly
            }
        }
    }

    async fn run_ephemeral(&mut self, op: &Operation) -> Result<Outcome, McpError> {
        let mut session = self.open_ephemeral().await?;
        let result = op.run(&mut session, op.bound(&self.timeouts)).await;
        if let Err(e) = session.close().await {
            debug!(server = %self.server, error = %e, "Failed to close ephemeral session");
        }
        result
    }

    async fn dispatch(&mut self, op: Operation) -> Result<Outcome, McpError> {
        // Taking the state out means a cancelled call leaves the manager
        // Uninitialized and the dropped session kills its child.
        let state = match std::mem::replace(&mut self.state, SessionState::Uninitialized) {
            SessionState::Uninitialized => self.establish().await,
            other => other,
        };

        match state {
            SessionState::PersistentActive(mut session) => {
                match op.run(&mut session, op.bound(&self.timeouts)).await {
                    Err(e) if e.poisons_session() => {
                        warn!(
                            server = %self.server,
                            method = op.method(),
                            error = %e,
                            "Persistent session failed, retrying on a fresh session"
                        );
                        if let Err(close_err) = session.close().await {
                            debug!(server = %self.server, error = %close_err, "Failed to close broken session");
                        }
                        self.run_ephemeral(&op).await
                    }
                    result => {
                        self.state = SessionState::PersistentActive(session);
                        result
                    }
                }
            }
            SessionState::EphemeralOnly => {
                self.state = SessionState::EphemeralOnly;
                self.run_ephemeral(&op).await
            }
            SessionState::Uninitialized => self.run_ephemeral(&op).await,
        }
    }

    /// Close the persistent session, if any. Errors are logged.
    pub async fn shutdown(&mut self) {
        if let SessionState::PersistentActive(mut session) =
            std::mem::replace(&mut self.state, SessionState::Uninitialized)
        {
            if let Err(e) = session.close().await {
                warn!(server = %self.server, error = %e, "Error closing persistent session");
            } else {
                debug!(server = %self.server, "Persistent session closed");
            }
        }
    }
}

fn unexpected(method: &str) -> McpError {
    McpError::protocol(format!("unexpected outcome for {}", method))
}

#[async_trait]
impl ToolSession for SessionManager {
    /// Requests carry their own bounds; establishment runs under the
    /// handshake timeout, not the request's.
    fn bounds_requests(&self) -> bool {
        true
    }

    async fn list_tools(&mut self) -> Result<Vec<McpToolDefinition>, McpError> {
        match self.dispatch(Operation::ListTools).await? {
            Outcome::Tools(tools) => Ok(tools),
            _ => Err(unexpected("tools/list")),
        }
    }

    async fn list_resources(&mut self) -> Result<Vec<McpResource>, McpError> {
        match self.dispatch(Operation::ListResources).await? {
            Outcome::Resources(resources) => Ok(resources),
            _ => Err(unexpected("resources/list")),
        }
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        let op = Operation::CallTool {
            name: name.to_string(),
            arguments,
        };
        match self.dispatch(op).await? {
            Outcome::Call(result) => Ok(result),
            _ => Err(unexpected("tools/call")),
        }
    }
}
