//! Configuration system for Toolmesh.
//!
//! Everything the orchestrator needs is resolved here once at startup and
//! handed to constructors explicitly: server descriptors, credential
//! environment variables, timeouts and the language-model provider.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// URL of the hosted Atlassian MCP endpoint.
pub const ATLASSIAN_MCP_URL: &str = "https://mcp.atlassian.com/v1/sse";

/// Main configuration struct for Toolmesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Timeouts applied to tool-server I/O
    pub timeouts: TimeoutsConfig,
    /// Provider configurations
    pub providers: ProvidersConfig,
    /// Tool servers, in registration order
    pub servers: Vec<ServerSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            timeouts: TimeoutsConfig::default(),
            providers: ProvidersConfig::default(),
            servers: vec![ServerSettings::atlassian()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Model used for synthesis and fallback answers
    pub model: String,
    /// Default provider
    pub provider: String,
    /// Maximum tokens for a synthesized answer
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Let tool-server processes write their debug output to stderr
    pub mcp_verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            provider: "anthropic".to_string(),
            max_tokens: 1024,
            temperature: 0.0,
            mcp_verbose: false,
        }
    }
}

/// Timeouts for every blocking operation against a tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Process launch plus `initialize` handshake
    pub handshake_secs: u64,
    /// `tools/list`
    pub list_tools_secs: u64,
    /// `resources/list`
    pub list_resources_secs: u64,
    /// A single `tools/call`
    pub tool_call_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            handshake_secs: 30,
            list_tools_secs: 20,
            list_resources_secs: 10,
            tool_call_secs: 60,
        }
    }
}

impl TimeoutsConfig {
    pub fn handshake(&self) -> Duration {
        Duration::from_secs(self.handshake_secs)
    }

    pub fn list_tools(&self) -> Duration {
        Duration::from_secs(self.list_tools_secs)
    }

    pub fn list_resources(&self) -> Duration {
        Duration::from_secs(self.list_resources_secs)
    }

    pub fn tool_call(&self) -> Duration {
        Duration::from_secs(self.tool_call_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Default provider to use
    pub default_provider: Option<String>,
    /// Anthropic configuration
    pub anthropic: Option<ProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key (can be set directly or via environment)
    pub api_key: Option<String>,
    /// Environment variable name for API key
    pub api_key_env: Option<String>,
    /// Default model for this provider
    pub default_model: Option<String>,
    /// Base URL (optional, for custom endpoints)
    pub base_url: Option<String>,
}

impl ProviderConfig {
    /// Resolve the API key from either direct value or environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }
        if let Some(ref env_var) = self.api_key_env {
            if let Ok(key) = std::env::var(env_var) {
                return Some(key);
            }
        }
        None
    }
}

/// Which adapter family drives a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerFamily {
    Atlassian,
    Github,
}

impl std::fmt::Display for ServerFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Atlassian => write!(f, "atlassian"),
            Self::Github => write!(f, "github"),
        }
    }
}

/// How to reach a tool server, as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportSettings {
    /// Launch a local process speaking MCP over stdio.
    Process {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Reach a remote endpoint through the local bridging launcher.
    Remote {
        #[serde(default)]
        url: Option<String>,
    },
}

/// One `[[servers]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Unique server name
    pub name: String,
    /// Adapter family
    pub family: ServerFamily,
    /// Whether the server is registered at startup
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Transport descriptor
    pub transport: TransportSettings,
    /// Literal environment overrides for the server process
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Names of variables copied from our own environment at startup
    #[serde(default)]
    pub env_passthrough: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl ServerSettings {
    /// The hosted Atlassian server, authenticated through API-token variables.
    pub fn atlassian() -> Self {
        Self {
            name: "Atlassian".to_string(),
            family: ServerFamily::Atlassian,
            enabled: true,
            transport: TransportSettings::Remote {
                url: Some(ATLASSIAN_MCP_URL.to_string()),
            },
            env: HashMap::new(),
            env_passthrough: vec![
                "ATLASSIAN_API_TOKEN".to_string(),
                "ATLASSIAN_EMAIL".to_string(),
                "ATLASSIAN_INSTANCE_URL".to_string(),
            ],
        }
    }

    /// Literal overrides plus every passthrough variable currently set.
    ///
    /// Unset passthrough variables are skipped rather than exported empty.
    pub fn resolve_env(&self) -> HashMap<String, String> {
        let mut env = self.env.clone();
        for key in &self.env_passthrough {
            if let Ok(value) = std::env::var(key) {
                env.insert(key.clone(), value);
            }
        }
        env
    }
}

/// Validation result with multiple issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation issues
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    /// Check if validation passed (no errors).
    pub fn is_ok(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == IssueSeverity::Error)
    }

    /// Get only error-level issues.
    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == IssueSeverity::Error).collect()
    }

    /// Get only warning-level issues.
    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == IssueSeverity::Warning).collect()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Error,
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Warning,
            field: field.into(),
            message: message.into(),
        });
    }
}

/// A single validation issue.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    /// Field path (e.g., "servers[0].transport.url")
    pub field: String,
    pub message: String,
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// Warnings don't prevent loading
    Warning,
    /// Errors prevent loading
    Error,
}

impl Config {
    /// Layered sources: defaults, user file, project file, local file, env.
    pub fn figment() -> Figment {
        let config_dir = Self::config_dir();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_dir.join("config.toml")))
            .merge(Toml::file(".toolmesh/config.toml"))
            // Project local config (gitignored)
            .merge(Toml::file(".toolmesh/config.local.toml"))
            // e.g. TOOLMESH_GENERAL__MODEL, TOOLMESH_TIMEOUTS__TOOL_CALL_SECS
            .merge(Env::prefixed("TOOLMESH_").split("__"))
    }

    /// Load configuration from all sources.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    /// Load and validate configuration.
    pub fn load_validated() -> Result<Self, Error> {
        let config = Self::load().map_err(|e| Error::Config(e.to_string()))?;
        config.ensure_valid()?;
        Ok(config)
    }

    /// Fail on validation errors, log warnings.
    pub fn ensure_valid(&self) -> Result<(), Error> {
        let result = self.validate();

        if !result.is_ok() {
            let errors: Vec<String> = result
                .errors()
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            return Err(Error::Config(format!(
                "Configuration validation failed:\n  {}",
                errors.join("\n  ")
            )));
        }

        for warning in result.warnings() {
            tracing::warn!("Config warning - {}: {}", warning.field, warning.message);
        }

        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.general.model.is_empty() {
            result.add_error("general.model", "Model name cannot be empty");
        }

        if self.general.provider.is_empty() {
            result.add_error("general.provider", "Provider name cannot be empty");
        }

        if self.general.max_tokens == 0 {
            result.add_error("general.max_tokens", "max_tokens must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.general.temperature) {
            result.add_error("general.temperature", "temperature must be between 0.0 and 1.0");
        }

        let timeouts = [
            ("timeouts.handshake_secs", self.timeouts.handshake_secs),
            ("timeouts.list_tools_secs", self.timeouts.list_tools_secs),
            ("timeouts.list_resources_secs", self.timeouts.list_resources_secs),
            ("timeouts.tool_call_secs", self.timeouts.tool_call_secs),
        ];
        for (field, secs) in timeouts {
            if secs == 0 {
                result.add_error(field, "timeout must be greater than 0");
            }
        }

        let mut seen = std::collections::HashSet::new();
        for (i, server) in self.servers.iter().enumerate() {
            let prefix = format!("servers[{}]", i);

            if server.name.trim().is_empty() {
                result.add_error(format!("{}.name", prefix), "Server name cannot be empty");
            } else if !seen.insert(server.name.as_str()) {
                result.add_error(
                    format!("{}.name", prefix),
                    format!("Duplicate server name '{}'", server.name),
                );
            }

            match &server.transport {
                TransportSettings::Process { command, .. } => {
                    if command.trim().is_empty() {
                        result.add_error(
                            format!("{}.transport.command", prefix),
                            "Process transport needs a command",
                        );
                    }
                }
                TransportSettings::Remote { url: None } => {
                    result.add_error(
                        format!("{}.transport.url", prefix),
                        "Remote transport needs a url",
                    );
                }
                TransportSettings::Remote { url: Some(url) } => {
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        result.add_error(
                            format!("{}.transport.url", prefix),
                            "url must start with http:// or https://",
                        );
                    }
                }
            }

            if !server.enabled {
                result.add_warning(format!("{}.enabled", prefix), "Server is disabled");
            }
        }

        if let Some(ref anthropic) = self.providers.anthropic {
            if anthropic.api_key.as_ref().map(|k| k.is_empty()).unwrap_or(false) {
                result.add_warning("providers.anthropic.api_key", "API key is empty string");
            }
            if let Some(ref base_url) = anthropic.base_url {
                if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                    result.add_error(
                        "providers.anthropic.base_url",
                        "base_url must start with http:// or https://",
                    );
                }
            }
        }

        result
    }

    /// Render the effective configuration as TOML, with API keys masked.
    pub fn to_toml_string(&self) -> Result<String, Error> {
        let mut shown = self.clone();
        if let Some(ref mut anthropic) = shown.providers.anthropic {
            if anthropic.api_key.is_some() {
                anthropic.api_key = Some("********".to_string());
            }
        }
        toml::to_string_pretty(&shown).map_err(|e| Error::Config(e.to_string()))
    }

    /// Get the configuration directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("toolmesh"))
            .unwrap_or_else(|| PathBuf::from("~/.config/toolmesh"))
    }

    /// Get the data directory (REPL history).
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .map(|p| p.join("toolmesh"))
            .unwrap_or_else(|| PathBuf::from("~/.local/share/toolmesh"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> Config {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(toml))
            .extract()
            .unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_ok(), "Default config should be valid: {:?}", result.issues);
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].family, ServerFamily::Atlassian);
    }

    #[test]
    fn test_default_timeouts() {
        let timeouts = TimeoutsConfig::default();
        assert_eq!(timeouts.handshake(), Duration::from_secs(30));
        assert_eq!(timeouts.list_tools(), Duration::from_secs(20));
        assert_eq!(timeouts.list_resources(), Duration::from_secs(10));
    }

    #[test]
    fn test_servers_from_toml() {
        let config = from_toml(
            r#"
            [timeouts]
            tool_call_secs = 15

            [[servers]]
            name = "GitHub"
            family = "github"
            transport = { kind = "process", command = "npx", args = ["-y", "@github/mcp-server"] }
            env = { GITHUB_TOKEN = "abc" }

            [[servers]]
            name = "Atlassian"
            family = "atlassian"
            transport = { kind = "remote", url = "https://mcp.atlassian.com/v1/sse" }
            "#,
        );

        assert_eq!(config.timeouts.tool_call_secs, 15);
        assert_eq!(config.timeouts.handshake_secs, 30);
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers[0].name, "GitHub");
        assert!(config.servers[0].enabled);
        assert_eq!(
            config.servers[0].transport,
            TransportSettings::Process {
                command: "npx".to_string(),
                args: vec!["-y".to_string(), "@github/mcp-server".to_string()],
            }
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_remote_without_url_is_error() {
        let mut config = Config::default();
        config.servers[0].transport = TransportSettings::Remote { url: None };
        let result = config.validate();
        assert!(!result.is_ok());
        assert!(result.errors().iter().any(|e| e.field == "servers[0].transport.url"));
        assert!(config.ensure_valid().is_err());
    }

    #[test]
    fn test_duplicate_server_names_are_errors() {
        let mut config = Config::default();
        config.servers.push(ServerSettings::atlassian());
        let result = config.validate();
        assert!(result.errors().iter().any(|e| e.field == "servers[1].name"));
    }

    #[test]
    fn test_zero_timeout_is_error() {
        let mut config = Config::default();
        config.timeouts.tool_call_secs = 0;
        let result = config.validate();
        assert!(result.errors().iter().any(|e| e.field == "timeouts.tool_call_secs"));
    }

    #[test]
    fn test_disabled_server_is_warning() {
        let mut config = Config::default();
        config.servers[0].enabled = false;
        let result = config.validate();
        assert!(result.is_ok());
        assert!(result.warnings().iter().any(|w| w.field == "servers[0].enabled"));
    }

    #[test]
    fn test_to_toml_masks_api_key() {
        let mut config = Config::default();
        config.providers.anthropic = Some(ProviderConfig {
            api_key: Some("sk-ant-secret".to_string()),
            ..Default::default()
        });
        let rendered = config.to_toml_string().unwrap();
        assert!(!rendered.contains("sk-ant-secret"));
        assert!(rendered.contains("mcp.atlassian.com"));
    }

    #[test]
    fn test_resolve_env_merges_passthrough() {
        std::env::set_var("TOOLMESH_TEST_PASSTHROUGH_TOKEN", "secret");
        let mut server = ServerSettings::atlassian();
        server.env.insert("LITERAL".to_string(), "1".to_string());
        server.env_passthrough = vec![
            "TOOLMESH_TEST_PASSTHROUGH_TOKEN".to_string(),
            "TOOLMESH_TEST_PASSTHROUGH_UNSET".to_string(),
        ];

        let env = server.resolve_env();
        assert_eq!(env.get("LITERAL").map(String::as_str), Some("1"));
        assert_eq!(
            env.get("TOOLMESH_TEST_PASSTHROUGH_TOKEN").map(String::as_str),
            Some("secret")
        );
        assert!(!env.contains_key("TOOLMESH_TEST_PASSTHROUGH_UNSET"));
    }
}
