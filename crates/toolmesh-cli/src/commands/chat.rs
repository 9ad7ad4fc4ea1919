//! Interactive query loop.

use std::path::PathBuf;
use std::sync::Arc;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use toolmesh_agent::{AgentError, Orchestrator};

use crate::AppContext;

pub async fn run(ctx: &Arc<AppContext>) -> anyhow::Result<()> {
    let mut orchestrator = ctx.orchestrator()?;

    print_welcome_banner(ctx);
    super::connect_all(&mut orchestrator);
    print_capabilities_preview(&mut orchestrator).await;

    let mut editor = DefaultEditor::new()?;
    let history_path = get_history_path();
    if history_path.exists() {
        let _ = editor.load_history(&history_path);
    }

    loop {
        match editor.readline(">>> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);

                if matches!(line.to_lowercase().as_str(), "quit" | "exit") {
                    println!("Goodbye!");
                    break;
                }

                match super::execute_cancellable(&mut orchestrator, line).await {
                    Ok(answer) => println!("\n{}\n", answer),
                    Err(AgentError::Cancelled) => println!("\n[Query cancelled]\n"),
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Some(parent) = history_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = editor.save_history(&history_path);

    orchestrator.shutdown().await;
    Ok(())
}

fn print_welcome_banner(ctx: &AppContext) {
    println!("toolmesh v{}", env!("CARGO_PKG_VERSION"));
    println!("Ask about your tools in plain language. Type 'quit' or press Ctrl+D to exit,");
    println!("Ctrl+C cancels a running query.");
    println!();

    if let Some(provider) = ctx.registry.default_provider() {
        println!("[Provider: {} | Model: {}]", provider.name(), ctx.config.general.model);
    }
}

async fn print_capabilities_preview(orchestrator: &mut Orchestrator) {
    if orchestrator.server_names().is_empty() {
        println!("[No MCP servers configured]\n");
        return;
    }

    // Warms every capability cache so the first query skips discovery.
    orchestrator.all_capabilities().await;

    for name in orchestrator.server_names() {
        if let Some(adapter) = orchestrator.adapter(name) {
            let cache = adapter.capabilities();
            if cache.is_cached() {
                println!(
                    "[{}: {} tools, {} resources]",
                    name,
                    cache.tools().len(),
                    cache.resources().len()
                );
            } else {
                println!("[{}: unavailable]", name);
            }
        }
    }
    println!();
}

fn get_history_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("toolmesh")
        .join("history.txt")
}
