//! Multi-server query orchestration.
//!
//! The [`Orchestrator`] owns every registered adapter together with the
//! session manager that connects it. A query is offered to each adapter in
//! registration order; the relevant ones run concurrently and their results
//! are combined and handed to the [`Synthesizer`].
//!
//! ```text
//! Orchestrator
//! ├── RegisteredServer*  (adapter + SessionManager)
//! ├── Connector          (how sessions are opened)
//! ├── Synthesizer        (fallback / synthesis via Provider)
//! └── CancellationToken
//! ```

use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use toolmesh_core::{Config, TimeoutsConfig};
use toolmesh_mcp::{Connector, McpError, SessionManager, SessionMode, StdioConnector};
use tracing::{debug, info, warn};

use crate::adapter::{ServerAdapter, ToolInvocation};
use crate::error::{AgentError, AgentResult};
use crate::synthesizer::Synthesizer;

/// Phrases that ask what the connected servers can do.
const CAPABILITY_PHRASES: &[&str] = &[
    "what tools",
    "available tools",
    "tools do you have",
    "list tools",
    "what can you do",
    "capabilities",
];

const NO_SERVERS_MESSAGE: &str = "No MCP servers are currently connected.";

/// Settings the orchestrator needs from the configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub timeouts: TimeoutsConfig,
    /// Quiet child processes and discard their stderr.
    pub suppress_debug_output: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutsConfig::default(),
            suppress_debug_output: true,
        }
    }
}

impl From<&Config> for OrchestratorConfig {
    fn from(config: &Config) -> Self {
        Self {
            timeouts: config.timeouts.clone(),
            suppress_debug_output: !config.general.mcp_verbose,
        }
    }
}

/// One adapter and, once its connection is prepared, its session manager.
struct RegisteredServer {
    adapter: Box<dyn ServerAdapter>,
    manager: Option<SessionManager>,
}

impl RegisteredServer {
    fn name(&self) -> &str {
        self.adapter.name()
    }

    /// Prepare the connection unless already done.
    fn ensure_connection(
        &mut self,
        suppress: bool,
        connector: &Arc<dyn Connector>,
        timeouts: &TimeoutsConfig,
    ) -> bool {
        if self.manager.is_some() {
            return true;
        }
        if !self.adapter.initialize_connection(suppress) {
            return false;
        }
        let Some(spec) = self.adapter.connection_spec().cloned() else {
            return false;
        };
        self.manager = Some(SessionManager::new(
            self.adapter.name(),
            spec,
            Arc::clone(connector),
            timeouts.clone(),
        ));
        true
    }

    /// Discover (if needed) then run `invocations` in order.
    async fn run(
        &mut self,
        invocations: Vec<ToolInvocation>,
        suppress: bool,
        connector: Arc<dyn Connector>,
        timeouts: TimeoutsConfig,
    ) -> ServerReport {
        let server = self.name().to_string();
        let mut report = ServerReport {
            server: server.clone(),
            calls: Vec::with_capacity(invocations.len()),
        };

        if !self.ensure_connection(suppress, &connector, &timeouts) {
            let error = McpError::init_failed("connection parameters could not be prepared");
            report.calls = invocations
                .into_iter()
                .map(|inv| CallReport::failed(inv.tool_name, &error))
                .collect();
            return report;
        }
        let Some(manager) = self.manager.as_mut() else {
            return report;
        };

        if !self.adapter.capabilities().is_cached() {
            if let Err(e) = self.adapter.discover_capabilities(manager, &timeouts).await {
                warn!(server = %server, error = %e, "Capability discovery failed, calling tools anyway");
            }
        }

        self.adapter.begin_query();
        for invocation in invocations {
            debug!(server = %server, tool = %invocation.tool_name, "Executing tool");
            let outcome = self
                .adapter
                .execute_server_specific_tool(manager, &invocation)
                .await;
            report.calls.push(match outcome {
                Ok(text) => CallReport {
                    tool: invocation.tool_name,
                    outcome: Ok(text),
                },
                Err(e) => {
                    warn!(server = %server, tool = %invocation.tool_name, error = %e, "Tool call failed");
                    CallReport::failed(invocation.tool_name, &e)
                }
            });
        }

        report
    }
}

/// What happened to one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallReport {
    pub tool: String,
    pub outcome: Result<String, String>,
}

impl CallReport {
    fn failed(tool: String, error: &McpError) -> Self {
        Self {
            tool,
            outcome: Err(error.to_string()),
        }
    }

    fn render(&self) -> String {
        match &self.outcome {
            Ok(text) => format!("Tool '{}': {}", self.tool, text),
            Err(error) => format!("Tool '{}' failed: {}", self.tool, error),
        }
    }
}

/// Results of every call made on one server for a query.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerReport {
    pub server: String,
    pub calls: Vec<CallReport>,
}

impl ServerReport {
    pub fn successes(&self) -> usize {
        self.calls.iter().filter(|c| c.outcome.is_ok()).count()
    }

    fn render(&self) -> String {
        let lines: Vec<String> = self.calls.iter().map(CallReport::render).collect();
        format!("**{} Results:**\n{}", self.server, lines.join("\n"))
    }
}

/// Combine per-server reports into the text given to synthesis.
pub fn combine_reports(reports: &[ServerReport]) -> String {
    reports
        .iter()
        .map(ServerReport::render)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Whether `query` asks for the capability listing.
pub fn is_capability_query(query: &str) -> bool {
    let lower = query.to_lowercase();
    CAPABILITY_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

/// Routes queries across registered tool servers.
pub struct Orchestrator {
    servers: Vec<RegisteredServer>,
    connector: Arc<dyn Connector>,
    synthesizer: Synthesizer,
    config: OrchestratorConfig,
    cancel_token: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator that spawns servers as child processes.
    pub fn new(synthesizer: Synthesizer, config: OrchestratorConfig) -> Self {
        Self::with_connector(synthesizer, config, Arc::new(StdioConnector))
    }

    /// Create an orchestrator that opens sessions through `connector`.
    pub fn with_connector(
        synthesizer: Synthesizer,
        config: OrchestratorConfig,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            servers: Vec::new(),
            connector,
            synthesizer,
            config,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Register an adapter. Names are unique.
    pub fn register(&mut self, adapter: Box<dyn ServerAdapter>) -> AgentResult<()> {
        let name = adapter.name().to_string();
        if self.servers.iter().any(|s| s.name() == name) {
            return Err(McpError::ServerAlreadyExists(name).into());
        }
        info!(server = %name, "Registered MCP server");
        self.servers.push(RegisteredServer {
            adapter,
            manager: None,
        });
        Ok(())
    }

    /// Names of registered servers, in registration order.
    pub fn server_names(&self) -> Vec<&str> {
        self.servers.iter().map(RegisteredServer::name).collect()
    }

    /// Servers whose connection has been prepared.
    pub fn connected_servers(&self) -> Vec<&str> {
        self.servers
            .iter()
            .filter(|s| s.manager.is_some())
            .map(RegisteredServer::name)
            .collect()
    }

    /// Session mode of a server's manager, if its connection is prepared.
    pub fn session_mode(&self, server: &str) -> Option<SessionMode> {
        self.find(server)?.manager.as_ref().map(SessionManager::mode)
    }

    /// Sessions opened so far for a server.
    pub fn connections_opened(&self, server: &str) -> usize {
        self.find(server)
            .and_then(|s| s.manager.as_ref())
            .map_or(0, SessionManager::connections_opened)
    }

    pub fn adapter(&self, server: &str) -> Option<&dyn ServerAdapter> {
        self.find(server).map(|s| s.adapter.as_ref())
    }

    fn find(&self, server: &str) -> Option<&RegisteredServer> {
        self.servers.iter().find(|s| s.name() == server)
    }

    /// Prepare every server's connection. Returns `(name, prepared)` pairs.
    pub fn initialize_all_connections(&mut self) -> Vec<(String, bool)> {
        let suppress = self.config.suppress_debug_output;
        self.servers
            .iter_mut()
            .map(|server| {
                let ok = server.ensure_connection(suppress, &self.connector, &self.config.timeouts);
                if ok {
                    info!(server = %server.name(), "Connection prepared");
                } else {
                    warn!(server = %server.name(), "Connection could not be prepared");
                }
                (server.name().to_string(), ok)
            })
            .collect()
    }

    /// Token that cancels the query in flight.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Reset the cancellation token for a new query.
    pub fn reset_cancel(&mut self) {
        self.cancel_token = CancellationToken::new();
    }

    /// Answer `query`, or return [`AgentError::Cancelled`] if the token
    /// fires first. Cancelling drops every in-flight server call.
    pub async fn execute(&mut self, query: &str) -> AgentResult<String> {
        let token = self.cancel_token.clone();
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = self.run_query(query) => Some(result),
        };

        match outcome {
            Some(result) => result,
            None => {
                info!("Query cancelled");
                self.reset_cancel();
                Err(AgentError::Cancelled)
            }
        }
    }

    async fn run_query(&mut self, query: &str) -> AgentResult<String> {
        if is_capability_query(query) {
            return Ok(self.all_capabilities().await);
        }

        let reports = self.fan_out(query).await;
        if reports.is_empty() {
            debug!("No server claimed the query, using fallback");
            return self.synthesizer.fallback_answer(query).await;
        }

        let successes: usize = reports.iter().map(ServerReport::successes).sum();
        if successes == 0 {
            info!("Every tool call failed, using fallback");
            return self.synthesizer.fallback_answer(query).await;
        }

        let combined = combine_reports(&reports);
        self.synthesizer.synthesize(query, &combined).await
    }

    /// Run the query on every relevant server concurrently.
    ///
    /// Reports come back in registration order; a server that found nothing
    /// to do is absent.
    pub async fn fan_out(&mut self, query: &str) -> Vec<ServerReport> {
        let suppress = self.config.suppress_debug_output;
        let timeouts = &self.config.timeouts;
        let connector = &self.connector;

        let work: Vec<_> = self
            .servers
            .iter_mut()
            .filter_map(|server| {
                let invocations = server.adapter.parse_query_intent(query);
                if invocations.is_empty() {
                    return None;
                }
                debug!(server = %server.name(), calls = invocations.len(), "Server claimed query");
                Some(server.run(invocations, suppress, Arc::clone(connector), timeouts.clone()))
            })
            .collect();

        join_all(work).await
    }

    /// Capability summaries for every server, discovering where needed.
    ///
    /// Discovery here uses a dedicated short-lived session per server.
    pub async fn all_capabilities(&mut self) -> String {
        if self.servers.is_empty() {
            return NO_SERVERS_MESSAGE.to_string();
        }

        let suppress = self.config.suppress_debug_output;
        for server in &mut self.servers {
            if server.adapter.capabilities().is_cached() {
                continue;
            }
            if !server.ensure_connection(suppress, &self.connector, &self.config.timeouts) {
                continue;
            }
            let Some(manager) = server.manager.as_mut() else {
                continue;
            };

            let name = server.adapter.name().to_string();
            match manager.open_ephemeral().await {
                Ok(mut session) => {
                    if let Err(e) = server
                        .adapter
                        .discover_capabilities(&mut session, &self.config.timeouts)
                        .await
                    {
                        warn!(server = %name, error = %e, "Failed to discover capabilities");
                    }
                    if let Err(e) = session.close().await {
                        debug!(server = %name, error = %e, "Failed to close discovery session");
                    }
                }
                Err(e) => warn!(server = %name, error = %e, "Failed to open discovery session"),
            }
        }

        let mut text = String::from("# Available MCP Capabilities\n\n");
        let mut total_tools = 0;
        for server in &self.servers {
            total_tools += server.adapter.capabilities().tools().len();
            text.push_str(&server.adapter.format_capabilities_summary());
            text.push('\n');
        }
        text.push_str(&format!(
            "\nTotal: {} tools across {} MCP server(s).",
            total_tools,
            self.servers.len()
        ));
        text
    }

    /// Close every persistent session. Errors are logged.
    pub async fn shutdown(&mut self) {
        for server in &mut self.servers {
            if let Some(manager) = server.manager.as_mut() {
                manager.shutdown().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_phrases() {
        assert!(is_capability_query("What tools do you have?"));
        assert!(is_capability_query("show me your capabilities"));
        assert!(!is_capability_query("show me KAN-7"));
    }

    #[test]
    fn test_combine_reports() {
        let reports = vec![
            ServerReport {
                server: "Atlassian".into(),
                calls: vec![
                    CallReport {
                        tool: "getJiraIssue".into(),
                        outcome: Ok("Issue KAN-7".into()),
                    },
                    CallReport {
                        tool: "getJiraIssue".into(),
                        outcome: Err("tools/call timed out after 60s".into()),
                    },
                ],
            },
            ServerReport {
                server: "GitHub".into(),
                calls: vec![CallReport {
                    tool: "listRepositories".into(),
                    outcome: Ok("acme/api".into()),
                }],
            },
        ];

        assert_eq!(
            combine_reports(&reports),
            "**Atlassian Results:**\n\
             Tool 'getJiraIssue': Issue KAN-7\n\
             Tool 'getJiraIssue' failed: tools/call timed out after 60s\n\
             \n\
             **GitHub Results:**\n\
             Tool 'listRepositories': acme/api"
        );
        assert_eq!(reports[0].successes(), 1);
    }
}
