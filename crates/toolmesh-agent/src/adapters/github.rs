//! GitHub repositories, issues and pull requests.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use toolmesh_mcp::{McpError, ServerConfig, ToolSession};
use tracing::debug;

use crate::adapter::{
    extract_text, generic_arguments, AdapterBase, ServerAdapter, ToolInvocation, MAX_INTENT_CALLS,
};
use crate::adapters::{contains_any, first_capture};

pub const LIST_REPOSITORIES: &str = "listRepositories";
pub const CREATE_ISSUE: &str = "createIssue";
pub const LIST_PULL_REQUESTS: &str = "listPullRequests";
pub const GET_REPOSITORY: &str = "getRepository";

const LIST_REPOS_PHRASES: &[&str] = &[
    "github repos",
    "my repositories",
    "list repos",
    "github repositories",
];

const CREATE_ISSUE_PHRASES: &[&str] = &["create github issue", "new github issue", "github issue"];

const PULL_REQUEST_PHRASES: &[&str] = &["pull requests", "prs", "github prs", "my pull requests"];

/// Slash-joined words that read like `owner/repo` but never are.
const NOT_REPOSITORIES: &[&str] = &[
    "and/or",
    "either/or",
    "yes/no",
    "on/off",
    "read/write",
    "input/output",
    "true/false",
    "client/server",
    "he/him",
    "she/her",
    "they/them",
];

static REPO_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9_.-]+/[a-zA-Z0-9_.-]+$").expect("repository pattern is valid")
});
static GITHUB_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:https?://)?(?:www\.)?github\.com/([a-zA-Z0-9_.-]+)/([a-zA-Z0-9_.-]+)")
        .expect("github url pattern is valid")
});
static TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)title[:\s]+"([^"]+)""#).expect("title pattern is valid"));
static BODY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:body|description)[:\s]+"([^"]+)""#).expect("body pattern is valid")
});
static REPO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)repo[:\s]+"([^"]+)""#).expect("repo pattern is valid"));

/// Adapter for a GitHub MCP server.
pub struct GithubAdapter {
    base: AdapterBase,
}

impl GithubAdapter {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            base: AdapterBase::new(config),
        }
    }

    fn arguments_for(&self, invocation: &ToolInvocation) -> Result<Value, McpError> {
        let text = invocation.parameters.as_str().unwrap_or_default();
        match invocation.tool_name.as_str() {
            LIST_REPOSITORIES => Ok(json!({"type": "owner", "sort": "updated"})),
            LIST_PULL_REQUESTS => Ok(json!({"state": "open", "sort": "updated"})),
            GET_REPOSITORY => {
                let (owner, repo) = split_repo(text);
                Ok(json!({"owner": owner, "repo": repo}))
            }
            CREATE_ISSUE => create_issue_arguments(text),
            other => generic_arguments(
                &invocation.parameters,
                self.capabilities()
                    .get()
                    .and_then(|c| c.tool(other))
                    .map(|t| &t.input_schema),
            ),
        }
    }
}

#[async_trait]
impl ServerAdapter for GithubAdapter {
    fn base(&self) -> &AdapterBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AdapterBase {
        &mut self.base
    }

    fn parse_query_intent(&self, query: &str) -> Vec<ToolInvocation> {
        let lower = query.to_lowercase();
        let mut calls = Vec::new();

        if contains_any(&lower, LIST_REPOS_PHRASES) {
            calls.push(ToolInvocation::new(LIST_REPOSITORIES, json!({})));
        } else if contains_any(&lower, CREATE_ISSUE_PHRASES) && lower.contains("create") {
            calls.push(ToolInvocation::new(CREATE_ISSUE, query));
        } else if contains_any(&lower, PULL_REQUEST_PHRASES) {
            calls.push(ToolInvocation::new(LIST_PULL_REQUESTS, json!({})));
        }

        calls.extend(
            repository_refs(query)
                .into_iter()
                .map(|reference| ToolInvocation::new(GET_REPOSITORY, reference)),
        );

        calls
    }

    async fn execute_server_specific_tool(
        &mut self,
        session: &mut dyn ToolSession,
        invocation: &ToolInvocation,
    ) -> Result<String, McpError> {
        let arguments = self.arguments_for(invocation)?;
        debug!(server = %self.name(), tool = %invocation.tool_name, "Calling tool");
        let result = session.call_tool(&invocation.tool_name, arguments).await?;
        extract_text(&invocation.tool_name, result)
    }

    fn tool_categories(&self) -> Vec<(&'static str, usize)> {
        let tools = self.capabilities().tools();
        if tools.is_empty() {
            return Vec::new();
        }
        let count = |needle: &str| {
            tools
                .iter()
                .filter(|t| t.name.to_lowercase().contains(needle))
                .count()
        };
        let repo = count("repo");
        let issue = count("issue");
        let pull = count("pull");
        vec![
            ("Repository Tools", repo),
            ("Issue Tools", issue),
            ("Pull Request Tools", pull),
            ("Other Tools", tools.len().saturating_sub(repo + issue + pull)),
        ]
    }
}

/// `owner/repo` references in the query, in order, at most
/// [`MAX_INTENT_CALLS`]. GitHub URLs count; other URLs and paths do not.
fn repository_refs(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .filter_map(repository_ref)
        .take(MAX_INTENT_CALLS)
        .collect()
}

fn repository_ref(token: &str) -> Option<String> {
    let token = token.trim_matches(|c: char| {
        matches!(c, '"' | '\'' | '`' | '(' | ')' | '[' | ']' | '<' | '>' | ',' | ';' | ':' | '?' | '!' | '.')
    });

    if let Some(caps) = GITHUB_URL.captures(token) {
        let repo = caps[2].trim_end_matches(".git");
        return Some(format!("{}/{}", &caps[1], repo));
    }

    let lower = token.to_lowercase();
    if lower.contains("://")
        || lower.starts_with("github.com/")
        || lower.starts_with("www.")
        || !REPO_REF.is_match(token)
        || NOT_REPOSITORIES.contains(&lower.as_str())
    {
        return None;
    }

    let (owner, repo) = token.split_once('/')?;
    let named = |part: &str| part.chars().any(|c| c.is_ascii_alphabetic());
    if named(owner) && named(repo) {
        Some(token.to_string())
    } else {
        None
    }
}

fn split_repo(reference: &str) -> (&str, &str) {
    reference.split_once('/').unwrap_or(("", reference))
}

/// Issue fields from quoted `title:`, `body:`/`description:` and `repo:`
/// values in the query. The repository falls back to the first
/// `owner/repo` reference.
fn create_issue_arguments(query: &str) -> Result<Value, McpError> {
    let title = first_capture(&TITLE, query).unwrap_or("New Issue");
    let body = first_capture(&BODY, query).unwrap_or("No description provided");
    let reference = match first_capture(&REPO, query) {
        Some(reference) => reference.to_string(),
        None => repository_refs(query).into_iter().next().ok_or_else(|| {
            McpError::InvalidArguments("no repository given for the new issue".to_string())
        })?,
    };
    let (owner, repo) = split_repo(&reference);

    Ok(json!({"owner": owner, "repo": repo, "title": title, "body": body}))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> GithubAdapter {
        GithubAdapter::new(ServerConfig::process(
            "GitHub",
            "npx",
            vec!["-y".to_string(), "@github/mcp-server".to_string()],
        ))
    }

    fn names(calls: &[ToolInvocation]) -> Vec<&str> {
        calls.iter().map(|c| c.tool_name.as_str()).collect()
    }

    #[test]
    fn test_list_intents() {
        assert_eq!(
            names(&adapter().parse_query_intent("list repos I own")),
            vec![LIST_REPOSITORIES]
        );
        assert_eq!(
            names(&adapter().parse_query_intent("any open pull requests?")),
            vec![LIST_PULL_REQUESTS]
        );
    }

    #[test]
    fn test_create_issue_requires_create() {
        assert_eq!(
            names(&adapter().parse_query_intent("create github issue about flaky CI")),
            vec![CREATE_ISSUE]
        );
        assert!(adapter().parse_query_intent("is there a github issue for this").is_empty());
    }

    #[test]
    fn test_repository_references_are_capped() {
        let calls = adapter().parse_query_intent("compare a/one b/two c/three d/four");
        assert_eq!(calls.len(), MAX_INTENT_CALLS);
        assert!(calls.iter().all(|c| c.tool_name == GET_REPOSITORY));
        assert_eq!(calls[0].parameters, json!("a/one"));
    }

    #[test]
    fn test_repository_urls_and_prose() {
        let calls = adapter().parse_query_intent("what is https://github.com/acme/api about?");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].parameters, json!("acme/api"));

        let calls = adapter().parse_query_intent("clone github.com/tokio-rs/tokio.git (or rust-lang/rust)");
        let refs: Vec<_> = calls.iter().map(|c| c.parameters.clone()).collect();
        assert_eq!(refs, vec![json!("tokio-rs/tokio"), json!("rust-lang/rust")]);

        assert!(adapter()
            .parse_query_intent("is support read and/or write, 24/7?")
            .is_empty());
        assert!(adapter()
            .parse_query_intent("see https://example.com/docs/page")
            .is_empty());
    }

    #[test]
    fn test_create_issue_repository_from_url() {
        let args =
            create_issue_arguments("create github issue in https://github.com/acme/api please")
                .unwrap();
        assert_eq!(args["owner"], json!("acme"));
        assert_eq!(args["repo"], json!("api"));
    }

    #[test]
    fn test_repository_arguments() {
        let args = adapter()
            .arguments_for(&ToolInvocation::new(GET_REPOSITORY, "tokio-rs/tokio"))
            .unwrap();
        assert_eq!(args, json!({"owner": "tokio-rs", "repo": "tokio"}));
    }

    #[test]
    fn test_create_issue_arguments() {
        let args = create_issue_arguments(
            r#"create github issue title: "Flaky test" body: "fails on CI" repo: "acme/api""#,
        )
        .unwrap();
        assert_eq!(
            args,
            json!({"owner": "acme", "repo": "api", "title": "Flaky test", "body": "fails on CI"})
        );

        assert!(matches!(
            create_issue_arguments("create github issue"),
            Err(McpError::InvalidArguments(_))
        ));
    }

    #[test]
    fn test_categories() {
        let mut adapter = adapter();
        adapter.capabilities_mut().replace(toolmesh_mcp::Capabilities {
            tools: serde_json::from_value(json!([
                {"name": "getRepository"},
                {"name": "createIssue"},
                {"name": "listPullRequests"},
                {"name": "searchCode"}
            ]))
            .unwrap(),
            resources: Vec::new(),
        });
        assert_eq!(
            adapter.tool_categories(),
            vec![
                ("Repository Tools", 1),
                ("Issue Tools", 1),
                ("Pull Request Tools", 1),
                ("Other Tools", 1)
            ]
        );
    }
}
