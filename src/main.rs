//! myriag: a remote code-execution service that runs untrusted snippets
//! inside disposable, per-language container sandboxes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::error;

mod cmd;

use myriag::config::Settings;
use myriag::engine::BollardEngine;

#[derive(Parser)]
#[command(name = "myriag")]
#[command(about = "Arbitrary code execution server backed by container sandboxes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: cmd::Commands,

    /// Path to configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Directory containing one subdirectory per language, overriding
    /// `languages_path` after the config file is loaded
    #[arg(short = 'l', long = "languages", env = "MYRIAG_LANGUAGES_PATH")]
    languages: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("myriag={log_level}").into()),
        )
        .json()
        .init();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(languages) = cli.languages {
        settings.set_languages_path(languages);
    }

    let engine = BollardEngine::connect()?;

    let ctx = cmd::Context {
        settings: Arc::new(settings),
        engine: Arc::new(engine),
    };

    if let Err(e) = cli.command.run(ctx).await {
        error!("{e:#}");
        std::process::exit(1);
    }

    Ok(())
}
