//! vrbackup CLI - V Rising Dedicated Server backups
//!
//! This is the main entry point for the vrbackup command-line interface.

mod cli;
mod commands;
mod output;
mod version;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Version(args) => commands::version::run(args),
        Commands::Backup(args) => {
            commands::backup::run(args, cli.config.as_deref(), cli.quiet).await
        }
        Commands::Locate(args) => commands::locate::run(args, cli.config.as_deref()),
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            // Info shows the pipeline stages and the final byte count
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
