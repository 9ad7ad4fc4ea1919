//! Capability listing across every configured server.

use std::sync::Arc;

use crate::AppContext;

pub async fn run(ctx: &Arc<AppContext>) -> anyhow::Result<()> {
    let mut orchestrator = ctx.orchestrator()?;
    super::connect_all(&mut orchestrator);

    println!("{}", orchestrator.all_capabilities().await);
    orchestrator.shutdown().await;
    Ok(())
}
