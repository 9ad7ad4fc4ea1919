//! Jira and Confluence through the hosted Atlassian MCP server.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use toolmesh_mcp::{McpError, ServerConfig, ToolSession};
use tracing::{debug, warn};

use crate::adapter::{
    extract_text, generic_arguments, with_argument, AdapterBase, ServerAdapter, ToolInvocation,
    MAX_INTENT_CALLS,
};
use crate::adapters::{capitalize, contains_any, first_capture};

pub const SEARCH_ISSUES: &str = "searchJiraIssuesUsingJql";
pub const GET_ISSUE: &str = "getJiraIssue";
pub const CREATE_ISSUE: &str = "createJiraIssue";
pub const CONFLUENCE_SPACES: &str = "getConfluenceSpaces";
pub const CONFLUENCE_SEARCH: &str = "searchConfluenceUsingCql";
pub const ACCESSIBLE_RESOURCES: &str = "getAccessibleAtlassianResources";
pub const VISIBLE_PROJECTS: &str = "getVisibleJiraProjects";

const CREATE_PHRASES: &[&str] = &["create", "new ticket", "new issue", "add ticket", "add issue"];

const MY_ISSUES_PHRASES: &[&str] = &[
    "what jira issues i have",
    "what issues i have",
    "my jira issues",
    "issues i have",
    "what tickets do i have",
    "my tickets",
];

const ALL_ISSUES_PHRASES: &[&str] = &[
    "all issues",
    "all my issues",
    "list all",
    "project issues",
    "all tickets",
    "everything",
    "show me all",
    "recent issues",
    "latest issues",
];

const ASSIGNED_PHRASES: &[&str] = &[
    "assigned to me",
    "what am i working on",
    "currently assigned",
    "my assigned",
    "working on",
];

const SEARCH_PHRASES: &[&str] = &["search", "find", "related to"];

const GENERAL_JIRA_PHRASES: &[&str] = &["issue", "ticket", "task", "jira"];

const CONFLUENCE_SPACES_PHRASES: &[&str] = &["confluence spaces", "what spaces", "list spaces"];

const CONFLUENCE_SEARCH_PHRASES: &[&str] = &["confluence", "search confluence", "find in confluence"];

/// Words stripped from a query to leave its search terms.
const SEARCH_NOISE_WORDS: &[&str] = &["find", "search", "related to", "confluence"];

const MY_ISSUES_JQL: &str =
    "assignee = currentUser() OR reporter = currentUser() ORDER BY updated DESC";
const ALL_ISSUES_JQL: &str = "ORDER BY updated DESC";
const ASSIGNED_JQL: &str = "assignee = currentUser() ORDER BY updated DESC";

const SEARCH_MAX_RESULTS: u32 = 20;
const FALLBACK_PROJECT_KEY: &str = "KAN";

static ISSUE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z]+-\d+\b").expect("issue key pattern is valid"));
static TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)title[:\s]+"([^"]+)""#).expect("title pattern is valid"));
static SUMMARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)summary[:\s]+"([^"]+)""#).expect("summary pattern is valid"));
static DESCRIPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)description[:\s]+"([^"]+)""#).expect("description pattern is valid")
});
static ISSUE_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:issue )?type[:\s]+"([^"]+)""#).expect("issue type pattern is valid")
});

/// Adapter for Jira and Confluence.
pub struct AtlassianAdapter {
    base: AdapterBase,
    cloud_id: Option<String>,
    /// The lookup already failed during the current query.
    cloud_id_failed: bool,
}

impl AtlassianAdapter {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            base: AdapterBase::new(config),
            cloud_id: None,
            cloud_id_failed: false,
        }
    }

    /// Cloud id memoized from an earlier call, if any.
    pub fn cloud_id(&self) -> Option<&str> {
        self.cloud_id.as_deref()
    }

    /// Resolve the site's cloud id once per adapter. A failed lookup is not
    /// repeated until the next query.
    async fn resolve_cloud_id(&mut self, session: &mut dyn ToolSession) -> Option<String> {
        if self.cloud_id.is_some() || self.cloud_id_failed {
            return self.cloud_id.clone();
        }
        let cache = self.capabilities();
        if cache.is_cached() && cache.tools().iter().all(|t| t.name != ACCESSIBLE_RESOURCES) {
            return None;
        }

        match session.call_tool(ACCESSIBLE_RESOURCES, json!({})).await {
            Ok(result) => {
                let id = first_json_entry(&result.joined_text(), "id");
                if let Some(id) = &id {
                    debug!(server = %self.name(), cloud_id = %id, "Resolved Atlassian cloud id");
                }
                self.cloud_id_failed = id.is_none();
                self.cloud_id = id;
            }
            Err(e) => {
                warn!(server = %self.name(), error = %e, "Could not resolve Atlassian cloud id");
                self.cloud_id_failed = true;
            }
        }
        self.cloud_id.clone()
    }

    async fn default_project_key(
        &self,
        session: &mut dyn ToolSession,
        cloud_id: Option<&str>,
    ) -> String {
        let arguments = match cloud_id {
            Some(id) => json!({"cloudId": id}),
            None => json!({}),
        };
        match session.call_tool(VISIBLE_PROJECTS, arguments).await {
            Ok(result) => first_json_entry(&result.joined_text(), "key")
                .unwrap_or_else(|| FALLBACK_PROJECT_KEY.to_string()),
            Err(e) => {
                debug!(server = %self.name(), error = %e, "Falling back to default project key");
                FALLBACK_PROJECT_KEY.to_string()
            }
        }
    }

    fn arguments_for(
        &self,
        invocation: &ToolInvocation,
        cloud_id: Option<&str>,
    ) -> Result<Value, McpError> {
        let text = invocation.parameters.as_str().unwrap_or_default();
        let arguments = match invocation.tool_name.as_str() {
            SEARCH_ISSUES => json!({"jql": text, "maxResults": SEARCH_MAX_RESULTS}),
            GET_ISSUE => json!({"issueIdOrKey": text}),
            CONFLUENCE_SPACES => json!({}),
            CONFLUENCE_SEARCH => json!({"cql": format!("text ~ \"{}\"", text)}),
            other => generic_arguments(
                &invocation.parameters,
                self.capabilities()
                    .get()
                    .and_then(|c| c.tool(other))
                    .map(|t| &t.input_schema),
            )?,
        };
        Ok(inject_cloud_id(arguments, cloud_id))
    }
}

#[async_trait]
impl ServerAdapter for AtlassianAdapter {
    fn base(&self) -> &AdapterBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AdapterBase {
        &mut self.base
    }

    fn parse_query_intent(&self, query: &str) -> Vec<ToolInvocation> {
        let lower = query.to_lowercase();
        let mut calls = Vec::new();

        if contains_any(&lower, CREATE_PHRASES) {
            calls.push(ToolInvocation::new(CREATE_ISSUE, query));
        } else if contains_any(&lower, MY_ISSUES_PHRASES) {
            calls.push(ToolInvocation::new(SEARCH_ISSUES, MY_ISSUES_JQL));
        } else if contains_any(&lower, ALL_ISSUES_PHRASES) {
            calls.push(ToolInvocation::new(SEARCH_ISSUES, ALL_ISSUES_JQL));
        } else if contains_any(&lower, ASSIGNED_PHRASES) {
            calls.push(ToolInvocation::new(SEARCH_ISSUES, ASSIGNED_JQL));
        }

        let keys = issue_keys(query);
        if !keys.is_empty() {
            calls.extend(keys.into_iter().map(|key| ToolInvocation::new(GET_ISSUE, key)));
        } else if contains_any(&lower, SEARCH_PHRASES) {
            let terms = search_terms(query);
            let jql = format!(
                "text ~ \"{terms}\" OR summary ~ \"{terms}\" ORDER BY updated DESC"
            );
            calls.push(ToolInvocation::new(SEARCH_ISSUES, jql));
        } else if contains_any(&lower, GENERAL_JIRA_PHRASES) {
            if calls.is_empty() {
                calls.push(ToolInvocation::new(SEARCH_ISSUES, MY_ISSUES_JQL));
            }
        } else if contains_any(&lower, CONFLUENCE_SPACES_PHRASES) {
            calls.push(ToolInvocation::new(CONFLUENCE_SPACES, json!({})));
        } else if contains_any(&lower, CONFLUENCE_SEARCH_PHRASES) {
            calls.push(ToolInvocation::new(CONFLUENCE_SEARCH, search_terms(query)));
        }

        calls
    }

    async fn execute_server_specific_tool(
        &mut self,
        session: &mut dyn ToolSession,
        invocation: &ToolInvocation,
    ) -> Result<String, McpError> {
        let cloud_id = self.resolve_cloud_id(session).await;

        let arguments = if invocation.tool_name == CREATE_ISSUE {
            let query = invocation.parameters.as_str().unwrap_or_default();
            let project_key = self.default_project_key(session, cloud_id.as_deref()).await;
            inject_cloud_id(create_issue_arguments(query, &project_key), cloud_id.as_deref())
        } else {
            self.arguments_for(invocation, cloud_id.as_deref())?
        };

        debug!(server = %self.name(), tool = %invocation.tool_name, "Calling tool");
        let result = session.call_tool(&invocation.tool_name, arguments).await?;
        extract_text(&invocation.tool_name, result)
    }

    fn begin_query(&mut self) {
        self.cloud_id_failed = false;
    }

    fn tool_categories(&self) -> Vec<(&'static str, usize)> {
        let tools = self.capabilities().tools();
        let count = |needle: &str| {
            tools
                .iter()
                .filter(|t| t.name.to_lowercase().contains(needle))
                .count()
        };
        let jira = count("jira");
        let confluence = count("confluence");
        if jira == 0 && confluence == 0 {
            return Vec::new();
        }
        vec![
            ("Jira Tools", jira),
            ("Confluence Tools", confluence),
            ("Other Tools", tools.len().saturating_sub(jira + confluence)),
        ]
    }
}

/// Up to [`MAX_INTENT_CALLS`] Jira keys such as `KAN-7`, case-insensitive.
fn issue_keys(query: &str) -> Vec<String> {
    let upper = query.to_uppercase();
    ISSUE_KEY
        .find_iter(&upper)
        .take(MAX_INTENT_CALLS)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn search_terms(query: &str) -> String {
    let mut terms = query.to_string();
    for word in SEARCH_NOISE_WORDS {
        terms = terms.replace(word, "").replace(&capitalize(word), "");
    }
    terms.trim().to_string()
}

fn create_issue_arguments(query: &str, project_key: &str) -> Value {
    let summary = first_capture(&TITLE, query)
        .or_else(|| first_capture(&SUMMARY, query))
        .unwrap_or("New Issue");
    let description = first_capture(&DESCRIPTION, query).unwrap_or("No description provided");
    let issue_type = first_capture(&ISSUE_TYPE, query).unwrap_or("Task");

    json!({
        "projectKey": project_key,
        "summary": summary,
        "description": description,
        "issueType": issue_type,
    })
}

fn inject_cloud_id(arguments: Value, cloud_id: Option<&str>) -> Value {
    match cloud_id {
        Some(id) => with_argument(arguments, "cloudId", id),
        None => arguments,
    }
}

/// `field` of the first element of a JSON array held in `text`.
fn first_json_entry(text: &str, field: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    value
        .as_array()?
        .first()?
        .get(field)?
        .as_str()
        .map(str::to_string)
}
