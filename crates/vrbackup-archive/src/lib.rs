//! vrbackup archive pipeline
//!
//! Packs the settings and save data of a V Rising Dedicated Server
//! installation into a single compressed archive, streaming files through
//! the encoder and reporting progress against the size of the save data.
//!
//! # Features
//!
//! - **Fixed inclusion table**: optional `run.bat`, the server settings
//!   directory and the saves directory, declared as data in [`plan`]
//! - **Streaming compression**: ZIP (deflate) or tar+gzip, never buffering
//!   the whole archive
//! - **Explicit job states**: validating, estimating, streaming, then exactly
//!   one of succeeded or failed
//! - **Progress reporting**: clamped percent and ETA from recent throughput
//!
//! # Examples
//!
//! ```no_run
//! use vrbackup_archive::{ArchiveRequest, FileSink, Pipeline, TerminalProgress};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let request = ArchiveRequest::new("/srv/steam/steamapps/common/VRisingDedicatedServer");
//!     let report = Pipeline::new(request, FileSink::new("VRisingServerData.zip"))
//!         .with_progress(TerminalProgress::new("Archiving"))
//!         .run()
//!         .await?;
//!
//!     println!("{}", report.message());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod estimate;
pub mod format;
pub mod job;
pub mod pipeline;
pub mod plan;
pub mod progress;
pub mod report;
pub mod sink;
pub mod writer;

// Re-export commonly used types
pub use error::{ArchiveError, ArchiveWarning, ErrorKind, Result};
pub use estimate::estimate;
pub use format::{ArchiveFormat, DEFAULT_COMPRESSION_LEVEL};
pub use job::{ArchiveJob, JobOutcome, JobState};
pub use pipeline::{preview, ArchiveRequest, Pipeline, PipelineEvent, Preview};
pub use plan::{InclusionPlan, InclusionRule, RuleKind, RUN_SCRIPT, SAVES_DIR, SETTINGS_DIR};
pub use progress::{
    ProgressReporter, ProgressSnapshot, RecordingProgress, SilentProgress, TerminalProgress,
};
pub use report::ArchiveReport;
pub use sink::{FileSink, MemorySink, OutputSink, SinkSignal};
pub use writer::{ArchiveEvent, ArchiveWriter, WriteSummary, WriterOptions};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_compression_level() {
        assert_eq!(DEFAULT_COMPRESSION_LEVEL, 6);
        assert_eq!(WriterOptions::default().compression_level, 6);
    }

    #[test]
    fn test_rule_paths() {
        assert_eq!(RUN_SCRIPT, "run.bat");
        assert_eq!(SETTINGS_DIR, "VRisingServer_Data/StreamingAssets/Settings");
        assert_eq!(SAVES_DIR, "save-data/Saves");
    }
}
