//! Error types for query orchestration.

use thiserror::Error;
use toolmesh_mcp::McpError;

/// Errors that can end a query.
///
/// Tool and session failures inside a query are not errors at this level:
/// they are reported as result lines and the query carries on.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Error from the language-model backend.
    #[error("Provider error: {0}")]
    Provider(#[from] anyhow::Error),

    /// Malformed configuration.
    #[error(transparent)]
    Config(#[from] toolmesh_core::Error),

    /// MCP failure outside the per-call boundary.
    #[error(transparent)]
    Mcp(#[from] McpError),

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;
