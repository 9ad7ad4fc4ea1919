//! Configured servers and their launch parameters.

use std::sync::Arc;

use toolmesh_mcp::ServerConfig;

use crate::AppContext;

pub fn run(ctx: &Arc<AppContext>) -> anyhow::Result<()> {
    let servers = &ctx.config.servers;
    if servers.is_empty() {
        println!("No MCP servers configured.");
        println!("Add a [[servers]] entry to {:?}", toolmesh_core::Config::config_dir().join("config.toml"));
        return Ok(());
    }

    let suppress = !ctx.config.general.mcp_verbose;
    println!("Configured MCP servers:\n");
    for settings in servers {
        let state = if settings.enabled { "enabled" } else { "disabled" };
        println!("  {} ({}, {})", settings.name, settings.family, state);

        match ServerConfig::from_settings(settings).to_connection_spec(suppress) {
            Ok(spec) => {
                println!("    command: {}", spec.command_line());
                let mut keys: Vec<&String> = spec.env.keys().collect();
                keys.sort();
                if !keys.is_empty() {
                    let keys: Vec<&str> = keys.into_iter().map(String::as_str).collect();
                    println!("    env: {}", keys.join(", "));
                }
            }
            Err(e) => println!("    ✗ {}", e),
        }
    }

    Ok(())
}
