use tracing::info;

use super::Context;
use crate::pool::ContainerPool;

pub async fn run(ctx: &Context) -> anyhow::Result<()> {
    let pool = ContainerPool::new(ctx.engine.clone(), ctx.settings.clone());
    let cleaned = pool.reap().await;
    info!(cleaned = ?cleaned, "cleaned");
    Ok(())
}
