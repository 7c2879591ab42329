//! Retake CLI
//!
//! Command-line interface for the Retake editing core.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use retake::cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Some(cmd) => handle_command(cmd),
        None => {
            println!("Retake v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Info { input } => retake::cli::commands::info(&input)?,
        Commands::Envelope {
            input,
            width,
            start,
            end,
        } => retake::cli::commands::envelope(&input, width, start, end)?,
        Commands::Convert {
            input,
            project,
            start,
            end,
            gain,
            blend_ms,
            fade_law,
        } => retake::cli::commands::convert(
            &input,
            &project,
            start,
            end,
            gain,
            blend_ms,
            fade_law.into(),
        )?,
    }
    Ok(())
}
