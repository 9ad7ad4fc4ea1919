//! CLI command implementations.

pub mod ask;
pub mod capabilities;
pub mod chat;
pub mod doctor;
pub mod servers;

use toolmesh_agent::{AgentResult, Orchestrator};

/// Run a query, cancelling it if Ctrl-C arrives first.
pub async fn execute_cancellable(orchestrator: &mut Orchestrator, query: &str) -> AgentResult<String> {
    let token = orchestrator.cancel_handle();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let result = orchestrator.execute(query).await;
    watcher.abort();
    result
}

/// Prepare every server's connection, reporting the ones that failed.
pub fn connect_all(orchestrator: &mut Orchestrator) {
    for (name, ok) in orchestrator.initialize_all_connections() {
        if !ok {
            eprintln!("  ✗ {} could not be prepared (see 'toolmesh doctor')", name);
        }
    }
}
