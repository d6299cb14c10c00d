//! Backup command

use anyhow::{bail, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, ValueEnum};
use console::style;
use vrbackup_archive::{
    preview, ArchiveFormat, ArchiveReport, ArchiveRequest, FileSink, Pipeline, Preview,
    TerminalProgress,
};
use vrbackup_core::{BackupConfig, DEFAULT_OUTPUT_NAME};

use crate::commands::locate::locator;
use crate::output;

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Server installation directory (default: discovered)
    #[arg(short, long)]
    pub server_dir: Option<Utf8PathBuf>,

    /// Archive file or directory (default: ./VRisingServerData.zip)
    #[arg(short, long)]
    pub output: Option<Utf8PathBuf>,

    /// Archive format (default: from the output extension, else zip)
    #[arg(short, long, value_enum)]
    pub format: Option<FormatArg>,

    /// Compression level (1-9)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=9))]
    pub compression: Option<u32>,

    /// Append a timestamp to the default archive name
    #[arg(long)]
    pub timestamp: bool,

    /// Show what would be archived without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    /// ZIP with deflate
    Zip,

    /// Gzip-compressed tarball
    TarGz,
}

impl FormatArg {
    fn to_lib_format(self) -> ArchiveFormat {
        match self {
            FormatArg::Zip => ArchiveFormat::Zip,
            FormatArg::TarGz => ArchiveFormat::TarGz,
        }
    }
}

/// Archive parameters after merging flags, the config file and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Resolved {
    output: Utf8PathBuf,
    format: ArchiveFormat,
    compression_level: u32,
}

pub async fn run(args: BackupArgs, config_path: Option<&Utf8Path>, quiet: bool) -> Result<()> {
    let config = BackupConfig::load(config_path)?;
    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
    let resolved = resolve(&args, &config, &timestamp)?;
    tracing::debug!("Resolved backup parameters: {:?}", resolved);
    let chatty = !quiet && !args.json;

    let located = locator(args.server_dir.clone(), &config).locate()?;

    let request = ArchiveRequest::new(located.source.path())
        .with_format(resolved.format)
        .with_compression_level(resolved.compression_level);

    if chatty {
        output::header("Backup V Rising Server");
        output::kv("Server", &located.source.to_string());
        output::kv("Found via", &located.origin.to_string());
        output::kv("Output", resolved.output.as_str());
        output::kv("Format", &resolved.format.to_string());
        output::kv("Compression", &resolved.compression_level.to_string());
        if let Some(inferred) = ArchiveFormat::from_path(resolved.output.as_std_path()) {
            if inferred != resolved.format {
                output::warning(&format!(
                    "Output name suggests {} but the archive will be written as {}",
                    inferred, resolved.format
                ));
            }
        }
        if args.dry_run {
            output::warning("DRY RUN MODE - No archive will be written");
        }
        println!();
    }

    if args.dry_run {
        return dry_run(&request, args.json, chatty);
    }

    let mut pipeline = Pipeline::new(request, FileSink::new(resolved.output.clone()));
    if chatty {
        pipeline = pipeline.with_progress(TerminalProgress::new("Archiving"));
    }
    let report = pipeline.run().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !quiet {
        print_summary(&report);
    }

    Ok(())
}

fn resolve(args: &BackupArgs, config: &BackupConfig, timestamp: &str) -> Result<Resolved> {
    let explicit_output = args.output.clone().or_else(|| config.output());

    let format = match (args.format, config.config.format.as_deref()) {
        (Some(flag), _) => flag.to_lib_format(),
        (None, Some(name)) => name.parse::<ArchiveFormat>().map_err(anyhow::Error::msg)?,
        (None, None) => explicit_output
            .as_deref()
            .and_then(|p| ArchiveFormat::from_path(p.as_std_path()))
            .unwrap_or_default(),
    };

    let stamped = args.timestamp || config.config.timestamp.unwrap_or(false);
    let file_name = default_file_name(format, stamped.then_some(timestamp));

    let output = match explicit_output {
        Some(dir) if is_directory_target(&dir) => dir.join(file_name),
        Some(path) => path,
        None => Utf8PathBuf::from(file_name),
    };

    Ok(Resolved {
        output,
        format,
        compression_level: args
            .compression
            .unwrap_or_else(|| config.compression_level()),
    })
}

/// `VRisingServerData[-<timestamp>].<ext>`
fn default_file_name(format: ArchiveFormat, timestamp: Option<&str>) -> String {
    let stem = DEFAULT_OUTPUT_NAME
        .strip_suffix(".zip")
        .unwrap_or(DEFAULT_OUTPUT_NAME);
    match timestamp {
        Some(ts) => format!("{}-{}.{}", stem, ts, format.extension()),
        None => format!("{}.{}", stem, format.extension()),
    }
}

fn is_directory_target(path: &Utf8Path) -> bool {
    path.is_dir() || path.as_str().ends_with('/') || path.as_str().ends_with('\\')
}

fn dry_run(request: &ArchiveRequest, json: bool, chatty: bool) -> Result<()> {
    let spinner = chatty.then(|| output::spinner("Measuring save data..."));
    let result = preview(request);
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let preview = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&preview_json(&preview))?);
    } else if chatty {
        print_preview(&preview);
    }

    let missing: Vec<&str> = preview
        .missing_required()
        .map(|rule| rule.archive_name.as_str())
        .collect();
    if !missing.is_empty() {
        bail!("Required source missing: {}", missing.join(", "));
    }

    if chatty {
        output::success("Dry run complete");
    }
    Ok(())
}

fn preview_json(preview: &Preview) -> serde_json::Value {
    let rules: Vec<serde_json::Value> = preview
        .rules
        .iter()
        .map(|(rule, present)| {
            serde_json::json!({
                "rule": rule,
                "present": present,
            })
        })
        .collect();

    serde_json::json!({
        "source": preview.source.path(),
        "rules": rules,
        "baseline_bytes": preview.baseline_bytes,
    })
}

fn print_preview(preview: &Preview) {
    output::info("Would include:");
    for (rule, present) in &preview.rules {
        let status = if *present {
            style("found").green()
        } else if rule.required {
            style("missing").red()
        } else {
            style("absent, skipped").yellow()
        };
        println!("  {:<48} {}", rule.archive_name, status);
    }
    println!();
    output::kv("Save data", &output::format_bytes(preview.baseline_bytes));
    println!();
}

fn print_summary(report: &ArchiveReport) {
    println!();
    output::success(&report.message());
    println!();
    output::kv("Location", &report.archive_path.display().to_string());
    output::kv(
        "Entries",
        &format!(
            "{} ({} files, {} directories)",
            report.entries(),
            report.files,
            report.directories
        ),
    );
    output::kv("Archived", &output::format_bytes(report.processed_bytes));
    output::kv("Size", &output::format_bytes(report.archive_bytes));
    if report.processed_bytes > 0 {
        output::kv(
            "Compression",
            &format!("{}%", report.compression_percentage()),
        );
    }
    output::kv("Duration", &format!("{:.1}s", report.duration_seconds));
    if !report.warnings.is_empty() {
        println!();
        for warning in &report.warnings {
            output::warning(&warning.to_string());
        }
    }
}
