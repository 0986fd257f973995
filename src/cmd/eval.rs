use tracing::info;

use super::Context;
use crate::eval::Evaluator;
use crate::pool::ContainerPool;

pub async fn run(ctx: &Context, language: &str, code: &str) -> anyhow::Result<()> {
    let limits = ctx.settings.resolve(language)?;
    let pool = ContainerPool::new(ctx.engine.clone(), ctx.settings.clone());
    let container = pool.select_or_create(language).await?;

    let evaluator = Evaluator::new(ctx.engine.clone());
    let result = evaluator.run(&container, code, limits).await?;

    info!(result = result.as_str(), "eval complete");
    Ok(())
}
