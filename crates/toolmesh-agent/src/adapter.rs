//! The [`ServerAdapter`] trait and the helpers adapters share.
//!
//! An adapter knows one family of tool server: how to reach it, which
//! queries it can answer, and how to shape arguments for its tools. It never
//! owns a session; the orchestrator lends it one per call.

use async_trait::async_trait;
use serde_json::{Map, Value};
use toolmesh_core::TimeoutsConfig;
use toolmesh_mcp::{
    CallToolResult, Capabilities, CapabilityCache, ConnectionSpec, McpError, ServerConfig,
    ToolSchema, ToolSession,
};
use tracing::{debug, warn};

/// Most identifiers (issue keys, repository references) one query may fan
/// out to.
pub const MAX_INTENT_CALLS: usize = 3;

/// How many tools a capability summary lists by name.
const SUMMARY_TOOL_LIMIT: usize = 10;

/// One tool call an adapter wants to make for a query.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub parameters: Value,
}

impl ToolInvocation {
    pub fn new(tool_name: impl Into<String>, parameters: impl Into<Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters: parameters.into(),
        }
    }
}

/// State every adapter carries: its immutable descriptor, the resolved
/// launch parameters and the capability cache.
#[derive(Debug)]
pub struct AdapterBase {
    config: ServerConfig,
    connection_spec: Option<ConnectionSpec>,
    capabilities: CapabilityCache,
}

impl AdapterBase {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            connection_spec: None,
            capabilities: CapabilityCache::new(),
        }
    }
}

/// Server-family specific behaviour plugged into the orchestrator.
#[async_trait]
pub trait ServerAdapter: Send {
    fn base(&self) -> &AdapterBase;

    fn base_mut(&mut self) -> &mut AdapterBase;

    fn config(&self) -> &ServerConfig {
        &self.base().config
    }

    fn name(&self) -> &str {
        self.config().name()
    }

    fn capabilities(&self) -> &CapabilityCache {
        &self.base().capabilities
    }

    fn capabilities_mut(&mut self) -> &mut CapabilityCache {
        &mut self.base_mut().capabilities
    }

    /// Launch parameters resolved by [`initialize_connection`](Self::initialize_connection).
    fn connection_spec(&self) -> Option<&ConnectionSpec> {
        self.base().connection_spec.as_ref()
    }

    /// Resolve and store the launch parameters. Returns false on any
    /// preparation failure.
    fn initialize_connection(&mut self, suppress_debug_output: bool) -> bool {
        match self.config().to_connection_spec(suppress_debug_output) {
            Ok(spec) => {
                debug!(server = %self.name(), command = %spec.command_line(), "Connection prepared");
                self.base_mut().connection_spec = Some(spec);
                true
            }
            Err(e) => {
                warn!(server = %self.name(), error = %e, "Failed to prepare connection");
                self.base_mut().connection_spec = None;
                false
            }
        }
    }

    /// Tool calls this adapter would make for `query`, in execution order.
    /// Empty means the query is not for this server.
    fn parse_query_intent(&self, query: &str) -> Vec<ToolInvocation>;

    /// Run one invocation through `session` and flatten the result to text.
    async fn execute_server_specific_tool(
        &mut self,
        session: &mut dyn ToolSession,
        invocation: &ToolInvocation,
    ) -> Result<String, McpError>;

    /// Fill the capability cache through `session` unless already cached.
    async fn discover_capabilities(
        &mut self,
        session: &mut dyn ToolSession,
        timeouts: &TimeoutsConfig,
    ) -> Result<Capabilities, McpError> {
        let name = self.name().to_string();
        self.capabilities_mut()
            .ensure(&name, session, timeouts)
            .await
            .cloned()
    }

    /// Called once per query, before that query's calls run on this server.
    fn begin_query(&mut self) {}

    /// Adapter-specific `(category, count)` breakdown of the cached tools.
    fn tool_categories(&self) -> Vec<(&'static str, usize)> {
        Vec::new()
    }

    /// Markdown summary of the cached capabilities.
    fn format_capabilities_summary(&self) -> String {
        let tools = self.capabilities().tools();
        let mut summary = format!("**{} MCP Server:**\n", self.name());
        summary.push_str(&format!("- Tools: {}\n", tools.len()));
        summary.push_str(&format!("- Resources: {}\n", self.capabilities().resources().len()));

        if !tools.is_empty() {
            summary.push_str("\n**Available Tools:**\n");
            for tool in tools.iter().take(SUMMARY_TOOL_LIMIT) {
                summary.push_str(&format!("- **{}**: {}\n", tool.name, tool.description_or_empty()));
            }
            if tools.len() > SUMMARY_TOOL_LIMIT {
                summary.push_str(&format!(
                    "- ... and {} more tools\n",
                    tools.len() - SUMMARY_TOOL_LIMIT
                ));
            }
        }

        let categories = self.tool_categories();
        if !categories.is_empty() {
            summary.push_str("\n**Tool Categories:**\n");
            for (category, count) in categories {
                summary.push_str(&format!("- {}: {}\n", category, count));
            }
        }

        summary
    }
}

/// Flatten a tool result to text, turning `isError` results into errors.
pub fn extract_text(tool: &str, result: CallToolResult) -> Result<String, McpError> {
    let text = result.joined_text();
    if result.is_error {
        return Err(McpError::ToolFailed {
            tool: tool.to_string(),
            message: text,
        });
    }
    if text.is_empty() && !result.content.is_empty() {
        return Ok(serde_json::to_string(&result.content)?);
    }
    Ok(text)
}

/// Arguments for a tool the adapter has no dedicated handling for.
///
/// With a discovered schema the parameters are marshalled against it;
/// otherwise strings become `{"query": s}`, objects pass through, null
/// becomes `{}` and anything else `{"input": "<value>"}`.
pub fn generic_arguments(parameters: &Value, schema: Option<&Value>) -> Result<Value, McpError> {
    if let Some(schema) = schema {
        let view = ToolSchema::new(schema);
        if view.properties().is_some_and(|props| !props.is_empty()) {
            return view.marshal(parameters.clone());
        }
    }

    Ok(match parameters {
        Value::Object(_) => parameters.clone(),
        Value::Null => Value::Object(Map::new()),
        Value::String(s) => single("query", Value::String(s.clone())),
        other => single("input", Value::String(other.to_string())),
    })
}

/// Insert `key` into an argument object, leaving other values alone.
pub fn with_argument(mut arguments: Value, key: &str, value: impl Into<Value>) -> Value {
    if let Value::Object(map) = &mut arguments {
        map.insert(key.to_string(), value.into());
    }
    arguments
}

fn single(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generic_arguments_without_schema() {
        assert_eq!(
            generic_arguments(&json!("open bugs"), None).unwrap(),
            json!({"query": "open bugs"})
        );
        assert_eq!(
            generic_arguments(&json!({"jql": "project = KAN"}), None).unwrap(),
            json!({"jql": "project = KAN"})
        );
        assert_eq!(generic_arguments(&Value::Null, None).unwrap(), json!({}));
        assert_eq!(generic_arguments(&json!(42), None).unwrap(), json!({"input": "42"}));
    }

    #[test]
    fn test_generic_arguments_follow_schema() {
        let schema = json!({
            "type": "object",
            "properties": {"limit": {"type": "integer"}},
            "required": ["limit"]
        });
        assert_eq!(
            generic_arguments(&json!("5"), Some(&schema)).unwrap(),
            json!({"limit": 5})
        );
        assert!(matches!(
            generic_arguments(&json!({}), Some(&schema)),
            Err(McpError::InvalidArguments(_))
        ));
    }

    #[test]
    fn test_empty_schema_uses_pass_through() {
        let schema = json!({"type": "object"});
        assert_eq!(
            generic_arguments(&json!("x"), Some(&schema)).unwrap(),
            json!({"query": "x"})
        );
    }

    #[test]
    fn test_extract_text() {
        assert_eq!(
            extract_text("getJiraIssue", CallToolResult::text("Issue KAN-7")).unwrap(),
            "Issue KAN-7"
        );

        let err = extract_text("getJiraIssue", CallToolResult::error("not found")).unwrap_err();
        assert!(matches!(err, McpError::ToolFailed { ref tool, .. } if tool == "getJiraIssue"));
    }

    #[test]
    fn test_with_argument() {
        let args = with_argument(json!({"jql": "x"}), "cloudId", "abc");
        assert_eq!(args, json!({"jql": "x", "cloudId": "abc"}));
    }
}
