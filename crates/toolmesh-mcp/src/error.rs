//! MCP-specific error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to spawn the child process.
    #[error("failed to spawn process: {0}")]
    SpawnFailed(std::io::Error),

    /// Failed to write to the transport.
    #[error("write error: {0}")]
    WriteError(std::io::Error),

    /// Failed to read from the transport.
    #[error("read error: {0}")]
    ReadError(std::io::Error),

    /// Connection was closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// Transport is not connected.
    #[error("not connected")]
    NotConnected,
}

/// Errors that can occur during MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Protocol-level error (malformed messages, etc.).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server initialization failed.
    #[error("initialization failed: {0}")]
    InitializationFailed(String),

    /// Server returned a JSON-RPC error response.
    #[error("server error (code {code}): {message}")]
    ServerError { code: i32, message: String },

    /// The tool ran but reported failure (`isError: true`).
    #[error("tool '{tool}' reported an error: {message}")]
    ToolFailed { tool: String, message: String },

    /// Tool arguments do not satisfy the discovered input schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection is not in the correct state.
    #[error("invalid connection state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Operation exceeded its configured bound.
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// Server already exists with this name.
    #[error("server already exists: {0}")]
    ServerAlreadyExists(String),
}

impl McpError {
    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an initialization failed error.
    pub fn init_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a server error from JSON-RPC error.
    pub fn server_error(code: i32, message: impl Into<String>) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidState {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Whether the session that produced this error can no longer be trusted.
    ///
    /// Tool-level failures come back on a healthy connection; everything that
    /// leaves the stream in an unknown position does not.
    pub fn poisons_session(&self) -> bool {
        match self {
            Self::ServerError { .. }
            | Self::ToolFailed { .. }
            | Self::InvalidArguments(_)
            | Self::ServerAlreadyExists(_) => false,
            Self::Transport(_)
            | Self::Protocol(_)
            | Self::InitializationFailed(_)
            | Self::Json(_)
            | Self::Io(_)
            | Self::InvalidState { .. }
            | Self::Timeout { .. } => true,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<McpError> for toolmesh_core::Error {
    fn from(e: McpError) -> Self {
        toolmesh_core::Error::Mcp(e.to_string())
    }
}
