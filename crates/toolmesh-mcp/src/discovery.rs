//! Capability discovery and caching.

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use toolmesh_core::TimeoutsConfig;
use tracing::{debug, info};

use crate::error::McpError;
use crate::protocol::{McpResource, McpToolDefinition};
use crate::session::ToolSession;

/// What one server offers, as of the last discovery.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub tools: Vec<McpToolDefinition>,
    pub resources: Vec<McpResource>,
}

impl Capabilities {
    /// Look up a tool by name.
    pub fn tool(&self, name: &str) -> Option<&McpToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }
}

/// List tools (bounded, required) then resources (bounded, best effort).
///
/// Sessions that bound their own requests are not wrapped again, so a
/// manager's connection setup keeps the handshake timeout.
pub async fn discover(
    server: &str,
    session: &mut dyn ToolSession,
    timeouts: &TimeoutsConfig,
) -> Result<Capabilities, McpError> {
    let enforce = !session.bounds_requests();

    let tools = bounded(enforce, timeouts.list_tools(), "tools/list", session.list_tools()).await?;

    let resources = match bounded(
        enforce,
        timeouts.list_resources(),
        "resources/list",
        session.list_resources(),
    )
    .await
    {
        Ok(resources) => resources,
        Err(e) => {
            debug!(server, error = %e, "Resource listing failed, continuing without resources");
            Vec::new()
        }
    };

    info!(
        server,
        tool_count = tools.len(),
        resource_count = resources.len(),
        "Discovered capabilities"
    );

    Ok(Capabilities { tools, resources })
}

async fn bounded<T>(
    enforce: bool,
    bound: Duration,
    method: &'static str,
    work: impl Future<Output = Result<T, McpError>>,
) -> Result<T, McpError> {
    if !enforce {
        return work.await;
    }
    timeout(bound, work)
        .await
        .map_err(|_| McpError::timeout(method, bound))?
}

/// Lazily filled, wholesale-replaced capability cache for one server.
#[derive(Debug, Clone, Default)]
pub struct CapabilityCache {
    current: Option<Capabilities>,
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cached(&self) -> bool {
        self.current.is_some()
    }

    pub fn get(&self) -> Option<&Capabilities> {
        self.current.as_ref()
    }

    /// Tools from the last discovery, empty if none ran.
    pub fn tools(&self) -> &[McpToolDefinition] {
        self.current.as_ref().map(|c| c.tools.as_slice()).unwrap_or_default()
    }

    pub fn resources(&self) -> &[McpResource] {
        self.current
            .as_ref()
            .map(|c| c.resources.as_slice())
            .unwrap_or_default()
    }

    pub fn replace(&mut self, capabilities: Capabilities) {
        self.current = Some(capabilities);
    }

    pub fn invalidate(&mut self) {
        self.current = None;
    }

    /// Discover through `session` unless already cached.
    pub async fn ensure(
        &mut self,
        server: &str,
        session: &mut dyn ToolSession,
        timeouts: &TimeoutsConfig,
    ) -> Result<&Capabilities, McpError> {
        if self.current.is_none() {
            let capabilities = discover(server, session, timeouts).await?;
            self.current = Some(capabilities);
        }
        self.current
            .as_ref()
            .ok_or_else(|| McpError::protocol("capability cache empty after discovery"))
    }

    /// Rediscover through `session`, replacing whatever was cached.
    pub async fn refresh(
        &mut self,
        server: &str,
        session: &mut dyn ToolSession,
        timeouts: &TimeoutsConfig,
    ) -> Result<&Capabilities, McpError> {
        self.invalidate();
        self.ensure(server, session, timeouts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ConnectionSpec;
    use crate::session::Session;
    use crate::testing::{ScriptedConnector, ScriptedServer};
    use crate::manager::{SessionManager, SessionMode};
    use std::collections::HashMap;
    use std::sync::Arc;

    async fn open(server: &ScriptedServer) -> Session {
        let spec = ConnectionSpec {
            command: "scripted".into(),
            args: vec![],
            env: HashMap::new(),
            quiet: true,
        };
        Session::open(
            "confluence",
            &ScriptedConnector::new(server.clone()),
            &spec,
            Duration::from_secs(1),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_discover_tools_and_resources() {
        let server = ScriptedServer::new()
            .with_tool("getConfluenceSpaces", "List spaces")
            .with_tool("searchConfluenceUsingCql", "Search pages")
            .with_resource("Engineering", "confluence://space/ENG");
        let mut session = open(&server).await;

        let caps = discover("confluence", &mut session, &TimeoutsConfig::default())
            .await
            .unwrap();
        assert_eq!(caps.tool_names(), vec!["getConfluenceSpaces", "searchConfluenceUsingCql"]);
        assert_eq!(caps.resources.len(), 1);
        assert!(caps.tool("searchConfluenceUsingCql").is_some());
    }

    #[tokio::test]
    async fn test_resource_failure_is_not_fatal() {
        let server = ScriptedServer::new()
            .with_tool("getConfluenceSpaces", "List spaces")
            .without_resources();
        let mut session = open(&server).await;

        let caps = discover("confluence", &mut session, &TimeoutsConfig::default())
            .await
            .unwrap();
        assert_eq!(caps.tools.len(), 1);
        assert!(caps.resources.is_empty());
    }

    #[tokio::test]
    async fn test_cache_is_idempotent_until_refresh() {
        let server = ScriptedServer::new().with_tool("getConfluenceSpaces", "List spaces");
        let mut session = open(&server).await;
        let timeouts = TimeoutsConfig::default();
        let mut cache = CapabilityCache::new();
        assert!(!cache.is_cached());
        assert!(cache.tools().is_empty());

        cache.ensure("confluence", &mut session, &timeouts).await.unwrap();
        cache.ensure("confluence", &mut session, &timeouts).await.unwrap();
        assert_eq!(server.list_tools_calls(), 1);

        cache.refresh("confluence", &mut session, &timeouts).await.unwrap();
        assert_eq!(server.list_tools_calls(), 2);
        assert_eq!(cache.tools().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_start_keeps_handshake_bound() {
        let server = ScriptedServer::new()
            .with_tool("getJiraIssue", "Fetch one issue")
            .slow_start(Duration::from_secs(25));
        let spec = ConnectionSpec {
            command: "scripted".into(),
            args: vec![],
            env: HashMap::new(),
            quiet: true,
        };
        let timeouts = TimeoutsConfig::default();
        let mut manager = SessionManager::new(
            "jira",
            spec,
            Arc::new(ScriptedConnector::new(server.clone())),
            timeouts.clone(),
        );

        let caps = discover("jira", &mut manager, &timeouts).await.unwrap();

        assert_eq!(caps.tool_names(), vec!["getJiraIssue"]);
        assert_eq!(manager.mode(), SessionMode::PersistentActive);
        assert_eq!(server.connect_attempts(), 1);
    }
}
