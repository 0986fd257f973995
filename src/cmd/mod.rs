//! CLI surface (A2): thin shells over the pool/evaluator/image-builder core.

mod build;
mod cleanup;
mod eval;
mod listen;
mod prepare;

use std::sync::Arc;

use clap::Subcommand;

use crate::config::Settings;
use crate::engine::EngineClient;

/// Shared handles every subcommand needs.
pub struct Context {
    pub settings: Arc<Settings>,
    pub engine: Arc<dyn EngineClient>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the container image for every configured language
    Build,
    /// Pre-create one container per configured language
    Prepare,
    /// Kill every service-owned container
    Cleanup,
    /// Evaluate one code snippet and print the result
    Eval {
        /// Language key as it appears in the Config Registry
        language: String,
        /// Source code to run
        code: String,
    },
    /// Start the HTTP server
    Listen,
}

impl Commands {
    pub async fn run(self, ctx: Context) -> anyhow::Result<()> {
        match self {
            Commands::Build => build::run(&ctx).await,
            Commands::Prepare => prepare::run(&ctx).await,
            Commands::Cleanup => cleanup::run(&ctx).await,
            Commands::Eval { language, code } => eval::run(&ctx, &language, &code).await,
            Commands::Listen => listen::run(ctx).await,
        }
    }
}
