//! # toolmesh-agent
//!
//! Query orchestration across MCP tool servers.
//!
//! This crate provides:
//! - The [`ServerAdapter`] trait and the Atlassian and GitHub adapters
//! - The [`Orchestrator`]: intent routing, concurrent fan-out, aggregation
//! - The [`Synthesizer`]: fallback and synthesis through a language model

pub mod adapter;
pub mod adapters;
pub mod error;
pub mod orchestrator;
pub mod synthesizer;

pub use adapter::{AdapterBase, ServerAdapter, ToolInvocation, MAX_INTENT_CALLS};
pub use adapters::{AtlassianAdapter, GithubAdapter};
pub use error::{AgentError, AgentResult};
pub use orchestrator::{
    combine_reports, is_capability_query, CallReport, Orchestrator, OrchestratorConfig,
    ServerReport,
};
pub use synthesizer::Synthesizer;
