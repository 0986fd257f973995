use tracing::info;

use super::Context;
use crate::image;

pub async fn run(ctx: &Context) -> anyhow::Result<()> {
    let langs = ctx.settings.language_names();
    info!(count = langs.len(), "building images");

    if ctx.settings.build_concurrently {
        image::build_concurrent(ctx.engine.clone(), &ctx.settings.languages_path, &langs).await?;
    } else {
        image::build_sequential(ctx.engine.as_ref(), &ctx.settings.languages_path, &langs).await?;
    }

    info!("images built");
    Ok(())
}
