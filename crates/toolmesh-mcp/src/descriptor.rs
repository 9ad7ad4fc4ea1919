//! Server descriptors and their translation into launch parameters.

use std::collections::HashMap;

use toolmesh_core::{Error, ServerSettings, TransportSettings};

/// Launcher used to bridge a remote MCP endpoint onto stdio.
pub const REMOTE_LAUNCHER_COMMAND: &str = "npx";
pub const REMOTE_LAUNCHER_ARGS: [&str; 2] = ["-y", "mcp-remote"];

/// Variables that quiet Node-based servers and the remote bridge.
pub const NOISE_SUPPRESSION_ENV: [(&str, &str); 7] = [
    ("NODE_ENV", "production"),
    ("DEBUG", ""),
    ("SILENT", "true"),
    ("MCP_LOG_LEVEL", "error"),
    ("NPX_QUIET", "true"),
    ("MCP_REMOTE_QUIET", "true"),
    ("MCP_REMOTE_SILENT", "1"),
];

/// How a server is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerTransport {
    /// Local process speaking MCP over stdio.
    Process { command: String, args: Vec<String> },
    /// Remote endpoint, launched through the bridging process.
    RemoteEndpoint { url: Option<String> },
}

/// Immutable description of one tool server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    name: String,
    transport: ServerTransport,
    env_overrides: HashMap<String, String>,
}

impl ServerConfig {
    pub fn process(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            transport: ServerTransport::Process {
                command: command.into(),
                args,
            },
            env_overrides: HashMap::new(),
        }
    }

    pub fn remote(name: impl Into<String>, url: Option<String>) -> Self {
        Self {
            name: name.into(),
            transport: ServerTransport::RemoteEndpoint { url },
            env_overrides: HashMap::new(),
        }
    }

    /// Build from a config entry, resolving passthrough variables now.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        let transport = match &settings.transport {
            TransportSettings::Process { command, args } => ServerTransport::Process {
                command: command.clone(),
                args: args.clone(),
            },
            TransportSettings::Remote { url } => ServerTransport::RemoteEndpoint { url: url.clone() },
        };
        Self {
            name: settings.name.clone(),
            transport,
            env_overrides: settings.resolve_env(),
        }
    }

    /// Add an environment override.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_overrides.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> &ServerTransport {
        &self.transport
    }

    pub fn env_overrides(&self) -> &HashMap<String, String> {
        &self.env_overrides
    }

    /// Translate into concrete launch parameters.
    ///
    /// With `suppress_debug_output` the noise variables are layered over a
    /// copy of the overrides and the child's stderr is discarded.
    pub fn to_connection_spec(&self, suppress_debug_output: bool) -> Result<ConnectionSpec, Error> {
        let mut env = self.env_overrides.clone();
        if suppress_debug_output {
            for (key, value) in NOISE_SUPPRESSION_ENV {
                env.insert(key.to_string(), value.to_string());
            }
        }

        let (command, args) = match &self.transport {
            ServerTransport::Process { command, args } => {
                if command.trim().is_empty() {
                    return Err(Error::config(format!(
                        "server '{}' has an empty command",
                        self.name
                    )));
                }
                (command.clone(), args.clone())
            }
            ServerTransport::RemoteEndpoint { url } => {
                let url = url
                    .as_deref()
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .ok_or_else(|| {
                        Error::config(format!("remote server '{}' has no url", self.name))
                    })?;
                let mut args: Vec<String> =
                    REMOTE_LAUNCHER_ARGS.iter().map(|a| a.to_string()).collect();
                args.push(url.to_string());
                (REMOTE_LAUNCHER_COMMAND.to_string(), args)
            }
        };

        Ok(ConnectionSpec {
            command,
            args,
            env,
            quiet: suppress_debug_output,
        })
    }
}

/// Concrete launch parameters for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    pub command: String,
    pub args: Vec<String>,
    /// Added on top of the inherited environment.
    pub env: HashMap<String, String>,
    /// Discard the child's stderr.
    pub quiet: bool,
}

impl ConnectionSpec {
    /// `command arg1 arg2 ...` for display.
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_uses_bridge_launcher() {
        let config = ServerConfig::remote("Atlassian", Some("https://mcp.atlassian.com/v1/sse".into()));
        let spec = config.to_connection_spec(false).unwrap();
        assert_eq!(spec.command, "npx");
        assert_eq!(spec.args, vec!["-y", "mcp-remote", "https://mcp.atlassian.com/v1/sse"]);
        assert!(spec.env.is_empty());
        assert!(!spec.quiet);
    }

    #[test]
    fn test_remote_without_url_is_config_error() {
        for url in [None, Some(String::new()), Some("  ".to_string())] {
            let config = ServerConfig::remote("jira", url);
            let err = config.to_connection_spec(true).unwrap_err();
            assert!(matches!(err, Error::Config(_)));
        }
    }

    #[test]
    fn test_empty_process_command_is_config_error() {
        let config = ServerConfig::process("broken", "", vec![]);
        assert!(matches!(config.to_connection_spec(false), Err(Error::Config(_))));
    }

    #[test]
    fn test_suppression_overlays_copy() {
        let config = ServerConfig::process("GitHub", "npx", vec!["-y".into(), "@github/mcp-server".into()])
            .with_env("GITHUB_TOKEN", "abc")
            .with_env("NODE_ENV", "development");

        let quiet = config.to_connection_spec(true).unwrap();
        assert!(quiet.quiet);
        assert_eq!(quiet.env.get("NODE_ENV").map(String::as_str), Some("production"));
        assert_eq!(quiet.env.get("DEBUG").map(String::as_str), Some(""));
        assert_eq!(quiet.env.get("MCP_REMOTE_SILENT").map(String::as_str), Some("1"));
        assert_eq!(quiet.env.get("GITHUB_TOKEN").map(String::as_str), Some("abc"));

        // The descriptor itself is untouched.
        assert_eq!(
            config.env_overrides().get("NODE_ENV").map(String::as_str),
            Some("development")
        );
        let verbose = config.to_connection_spec(false).unwrap();
        assert_eq!(verbose.env.len(), 2);
        assert_eq!(verbose.command_line(), "npx -y @github/mcp-server");
    }

    #[test]
    fn test_from_settings() {
        let settings = ServerSettings::atlassian();
        let config = ServerConfig::from_settings(&settings);
        assert_eq!(config.name(), "Atlassian");
        assert!(matches!(
            config.transport(),
            ServerTransport::RemoteEndpoint { url: Some(_) }
        ));
    }
}
