//! livesite CLI - a scheduled agent that keeps a website evolving
//!
//! The binary parses flags, sets up logging and hands off to one of the
//! command modules. Everything that touches the site lives in
//! `livesite-core`.
use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod output;
mod utils;

use cli::{Cli, Mode};
use utils::{config_path, initialize_logging};

/// Execute the livesite CLI with the current environment.
///
/// # Errors
///
/// Returns an error if logging cannot be initialized, the configuration is
/// invalid, or the selected command fails.
pub async fn run() -> Result<()> {
    // Convert Broken pipe panics into a clean exit
    std::panic::set_hook(Box::new(|info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe") || msg.contains("broken pipe") {
            std::process::exit(0);
        }
        eprintln!("{msg}");
    }));

    let cli = Cli::parse();
    initialize_logging(&cli)?;
    execute(&cli).await
}

async fn execute(cli: &Cli) -> Result<()> {
    let config = config_path(cli.config.as_deref())?;
    tracing::debug!(path = %config.display(), "using config");

    match cli.mode() {
        Mode::Setup => commands::setup(&config, cli.format),
        Mode::Analyze => commands::analyze(&config, cli.seed, cli.format),
        Mode::Now => commands::run_now(&config, cli.seed, cli.format).await,
        Mode::Schedule => commands::schedule(&config, cli.seed).await,
    }
}
