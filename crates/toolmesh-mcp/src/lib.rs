//! # toolmesh-mcp
//!
//! MCP (Model Context Protocol) client plumbing for Toolmesh.
//!
//! This crate provides:
//! - JSON-RPC / MCP protocol types
//! - stdio transport and the [`Connector`] seam
//! - Server descriptors and their launch parameters
//! - Sessions, and a per-server [`SessionManager`] with ephemeral fallback
//! - Capability discovery and schema-driven argument shaping
//! - An in-memory scripted server for tests (feature `testing`)

pub mod descriptor;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod schema;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;

pub use descriptor::{ConnectionSpec, ServerConfig, ServerTransport};
pub use discovery::{discover, Capabilities, CapabilityCache};
pub use error::{McpError, TransportError};
pub use manager::{SessionManager, SessionMode};
pub use protocol::{CallToolResult, McpResource, McpToolDefinition, ToolContent};
pub use schema::ToolSchema;
pub use session::{ConnectionState, Session, ToolSession};
pub use transport::{Connector, StdioConnector, StdioTransport, Transport};
