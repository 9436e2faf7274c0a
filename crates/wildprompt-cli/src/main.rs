//! wildprompt CLI binary.
//!
//! - Preview wildcard expansion
//! - Run the prompt pipeline over a JSON request
//! - Run tag scripts
//! - List and watch the wildcard directory

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod request;

use cli::{Cli, Commands};

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // The wildcard store logs through `log`
    tracing_log::LogTracer::init()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = commands::resolve_config(&cli)?;

    match &cli.command {
        Commands::Expand { text } => commands::expand(&config, text)?,
        Commands::Process {
            request,
            session,
            json,
        } => commands::process(&config, request, session.as_ref(), *json)?,
        Commands::List => commands::list(&config)?,
        Commands::Script { file, tags } => commands::script(&config, file, tags)?,
        Commands::Watch => commands::watch(&config)?,
    }

    Ok(())
}
