//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

pub use crate::commands::backup::BackupArgs;
pub use crate::commands::locate::LocateArgs;

/// vrbackup - Back up V Rising Dedicated Server settings and saves
#[derive(Parser, Debug)]
#[command(name = "vrbackup")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to vrbackup.yaml config file
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show version information
    Version(VersionArgs),

    /// Archive the server settings and saves
    Backup(BackupArgs),

    /// Show which server installation would be backed up
    Locate(LocateArgs),
}

// Version command
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
