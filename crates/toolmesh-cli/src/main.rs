//! # toolmesh-cli
//!
//! Command-line interface for Toolmesh.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use toolmesh_agent::{adapters, Orchestrator, OrchestratorConfig, Synthesizer};
use toolmesh_core::error::format_error_with_suggestion;
use toolmesh_core::{Config, Error};
use toolmesh_providers::ProviderRegistry;

mod commands;

/// Application context containing shared state.
pub struct AppContext {
    pub config: Config,
    pub registry: ProviderRegistry,
}

impl AppContext {
    /// Build an orchestrator with every enabled server registered.
    pub fn orchestrator(&self) -> anyhow::Result<Orchestrator> {
        let provider = self.registry.default_provider().ok_or_else(|| {
            let err = Error::provider_not_configured(&self.config.general.provider);
            anyhow::anyhow!(format_error_with_suggestion(&err))
        })?;

        let synthesizer = Synthesizer::new(provider, self.config.general.model.clone())
            .with_temperature(self.config.general.temperature)
            .with_max_tokens(self.config.general.max_tokens);
        let mut orchestrator = Orchestrator::new(synthesizer, OrchestratorConfig::from(&self.config));

        for settings in self.config.servers.iter().filter(|s| s.enabled) {
            orchestrator.register(adapters::from_settings(settings))?;
        }

        Ok(orchestrator)
    }
}

/// Toolmesh - ask questions across MCP tool servers
#[derive(Parser)]
#[command(name = "toolmesh")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Let tool servers write their own diagnostics to stderr
    #[arg(long, global = true)]
    mcp_verbose: bool,

    /// Model to use for answers
    #[arg(short, long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single query and exit
    Ask {
        /// The question to ask
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Interactive session
    Chat,
    /// Discover and list what every server offers
    Capabilities,
    /// List configured servers and how they are launched
    Servers,
    /// Diagnose installation issues
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so answers on stdout stay clean
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut config = match Config::load_validated() {
        Ok(config) => config,
        Err(e) => anyhow::bail!(format_error_with_suggestion(&e)),
    };
    if let Some(model) = cli.model.clone() {
        config.general.model = model;
    }
    if cli.mcp_verbose {
        config.general.mcp_verbose = true;
    }

    let registry = ProviderRegistry::from_config(&config);
    let ctx = Arc::new(AppContext { config, registry });

    match cli.command {
        Commands::Ask { query } => {
            commands::ask::run(&query.join(" "), &ctx).await?;
        }
        Commands::Chat => {
            commands::chat::run(&ctx).await?;
        }
        Commands::Capabilities => {
            commands::capabilities::run(&ctx).await?;
        }
        Commands::Servers => {
            commands::servers::run(&ctx)?;
        }
        Commands::Doctor => {
            commands::doctor::run(&ctx)?;
        }
    }

    Ok(())
}
