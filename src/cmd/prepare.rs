use tracing::info;

use super::Context;
use crate::pool::ContainerPool;

pub async fn run(ctx: &Context) -> anyhow::Result<()> {
    let pool = ContainerPool::new(ctx.engine.clone(), ctx.settings.clone());
    let langs = ctx.settings.language_names();
    pool.prepare_all(&langs).await?;
    info!(count = langs.len(), "containers prepared");
    Ok(())
}
