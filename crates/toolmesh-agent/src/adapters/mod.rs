//! Concrete server adapters.

pub mod atlassian;
pub mod github;

pub use atlassian::AtlassianAdapter;
pub use github::GithubAdapter;

use regex::Regex;
use toolmesh_core::{ServerFamily, ServerSettings};
use toolmesh_mcp::ServerConfig;

use crate::adapter::ServerAdapter;

/// Build the adapter for a configured server.
pub fn from_settings(settings: &ServerSettings) -> Box<dyn ServerAdapter> {
    let config = ServerConfig::from_settings(settings);
    match settings.family {
        ServerFamily::Atlassian => Box::new(AtlassianAdapter::new(config)),
        ServerFamily::Github => Box::new(GithubAdapter::new(config)),
    }
}

pub(crate) fn contains_any(haystack: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| haystack.contains(phrase))
}

pub(crate) fn first_capture<'a>(pattern: &Regex, text: &'a str) -> Option<&'a str> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

pub(crate) fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
