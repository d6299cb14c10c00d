//! Locate command

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use vrbackup_core::{BackupConfig, InstallLocator};

use crate::output;

#[derive(Args, Debug)]
pub struct LocateArgs {
    /// Server installation directory to try first
    #[arg(short, long)]
    pub server_dir: Option<Utf8PathBuf>,
}

pub fn run(args: LocateArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = BackupConfig::load(config_path)?;
    let locator = locator(args.server_dir, &config);

    output::header("Server Installation");
    for candidate in locator.candidates() {
        output::kv(&candidate.origin.to_string(), &candidate.path.display().to_string());
    }
    println!();

    let located = locator.locate()?;

    for rejection in &located.rejected {
        output::error(&rejection.to_string());
    }
    output::success(&format!(
        "Using {} (from {})",
        located.source, located.origin
    ));

    Ok(())
}

/// Discovery seeded with the flag and the config file's `server_dir`.
pub fn locator(flag: Option<Utf8PathBuf>, config: &BackupConfig) -> InstallLocator {
    InstallLocator::from_env()
        .with_flag(flag)
        .with_config(config.server_dir())
}
