//! Diagnostic command to check installation.

use std::path::Path;
use std::sync::Arc;

use toolmesh_core::config::IssueSeverity;
use toolmesh_core::Config;
use toolmesh_mcp::ServerConfig;

use crate::AppContext;

pub fn run(ctx: &Arc<AppContext>) -> anyhow::Result<()> {
    println!("Running diagnostics...\n");

    let config_dir = Config::config_dir();
    println!("Config directory: {:?}", config_dir);
    if config_dir.join("config.toml").exists() {
        println!("  ✓ config.toml found");
    } else {
        println!("  ✗ No config.toml (defaults in use)");
    }

    let data_dir = Config::data_dir();
    println!("\nData directory: {:?}", data_dir);
    if data_dir.exists() {
        println!("  ✓ Exists");
    } else {
        println!("  ✗ Does not exist (will be created on first use)");
    }

    println!("\nConfiguration:");
    let validation = ctx.config.validate();
    if validation.issues.is_empty() {
        println!("  ✓ No issues");
    }
    for issue in &validation.issues {
        let marker = match issue.severity {
            IssueSeverity::Error => "✗",
            IssueSeverity::Warning => "!",
        };
        println!("  {} {}: {}", marker, issue.field, issue.message);
    }

    println!("\nProviders:");
    let providers = ctx.registry.list();
    if providers.is_empty() {
        println!("  ✗ No providers configured");
    }
    for provider_id in &providers {
        if let Some(provider) = ctx.registry.get(provider_id) {
            let status = if provider.is_configured() {
                "✓ configured"
            } else {
                "✗ not configured"
            };
            println!("  {} {} ({})", status, provider.name(), provider_id);
        }
    }
    match ctx.registry.default_provider() {
        Some(default) => println!("  Default: {} ({})", default.name(), default.id()),
        None => println!("  Default: ✗ none"),
    }

    let model = &ctx.config.general.model;
    let known = ctx.registry.all_models();
    if known.iter().any(|m| &m.id == model) {
        println!("  ✓ Model {} is available", model);
    } else if !known.is_empty() {
        println!("  ! Model {} is not in the known model list", model);
    }
    if std::env::var("ANTHROPIC_API_KEY").is_ok() {
        println!("  ✓ ANTHROPIC_API_KEY is set");
    } else {
        println!("  ✗ ANTHROPIC_API_KEY is not set");
    }

    println!("\nMCP servers:");
    if ctx.config.servers.is_empty() {
        println!("  ✗ None configured");
    }
    let suppress = !ctx.config.general.mcp_verbose;
    for settings in &ctx.config.servers {
        if !settings.enabled {
            println!("  - {} (disabled)", settings.name);
            continue;
        }
        match ServerConfig::from_settings(settings).to_connection_spec(suppress) {
            Ok(spec) if find_on_path(&spec.command) => {
                println!("  ✓ {} ({})", settings.name, spec.command_line());
            }
            Ok(spec) => {
                println!("  ✗ {}: '{}' not found on PATH", settings.name, spec.command);
            }
            Err(e) => println!("  ✗ {}: {}", settings.name, e),
        }
    }

    println!("\nDiagnostics complete.");
    Ok(())
}

fn find_on_path(command: &str) -> bool {
    let path = Path::new(command);
    if path.components().count() > 1 {
        return path.exists();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(command).is_file()))
        .unwrap_or(false)
}
