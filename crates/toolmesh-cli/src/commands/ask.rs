//! One-shot query.

use std::sync::Arc;

use toolmesh_agent::AgentError;

use crate::AppContext;

pub async fn run(query: &str, ctx: &Arc<AppContext>) -> anyhow::Result<()> {
    let mut orchestrator = ctx.orchestrator()?;
    super::connect_all(&mut orchestrator);

    let result = super::execute_cancellable(&mut orchestrator, query).await;
    orchestrator.shutdown().await;

    match result {
        Ok(answer) => {
            println!("{}", answer);
            Ok(())
        }
        Err(AgentError::Cancelled) => {
            eprintln!("[Operation cancelled]");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
