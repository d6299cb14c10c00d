//! Pipeline coordinator.
//!
//! Validates the source, measures the baseline, then runs the writer on a
//! blocking thread. Writer and sink events come back over a bounded channel
//! and are applied to the [`ArchiveJob`] one at a time, so job state is only
//! ever touched from the coordinator. When the channel is full the writer
//! blocks, which also bounds how far reading can run ahead of reporting.

use crate::error::{ArchiveError, Result};
use crate::estimate::estimate;
use crate::format::{clamp_level, ArchiveFormat};
use crate::job::ArchiveJob;
use crate::plan::{InclusionPlan, InclusionRule};
use crate::progress::{ProgressReporter, SilentProgress};
use crate::report::ArchiveReport;
use crate::sink::{OutputSink, SinkSignal};
use crate::writer::{source_present, ArchiveEvent, ArchiveWriter, WriteSummary, WriterOptions};
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vrbackup_core::SourceDirectory;

/// Capacity of the writer → coordinator event channel.
pub const EVENT_BUFFER: usize = 64;

/// Everything the coordinator needs for one run.
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    pub source_dir: PathBuf,
    pub plan: InclusionPlan,
    pub options: WriterOptions,
}

impl ArchiveRequest {
    /// A request for the standard server rule table.
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            plan: InclusionPlan::server_default(),
            options: WriterOptions::default(),
        }
    }

    pub fn with_plan(mut self, plan: InclusionPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_format(mut self, format: ArchiveFormat) -> Self {
        self.options.format = format;
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.options.compression_level = clamp_level(level);
        self
    }
}

/// Messages from the blocking side.
#[derive(Debug)]
pub enum PipelineEvent {
    Writer(ArchiveEvent),
    Sink(SinkSignal),
}

/// Runs one archive job into one sink.
pub struct Pipeline<S: OutputSink> {
    request: ArchiveRequest,
    sink: S,
    progress: Box<dyn ProgressReporter>,
}

impl<S: OutputSink> Pipeline<S> {
    pub fn new(request: ArchiveRequest, sink: S) -> Self {
        Self {
            request,
            sink,
            progress: Box::new(SilentProgress),
        }
    }

    pub fn with_progress(mut self, progress: impl ProgressReporter + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    /// Runs the job to its single terminal outcome.
    pub async fn run(self) -> Result<ArchiveReport> {
        let Pipeline {
            request,
            mut sink,
            mut progress,
        } = self;

        let started = Instant::now();
        let mut job = ArchiveJob::new(sink.location(), request.plan.rules().to_vec());

        // Validating
        info!("Validating server directory {}", request.source_dir.display());
        let source = match validate(&request, &mut sink) {
            Ok(source) => source,
            Err(e) => return Err(abort(&mut job, progress.as_mut(), e)),
        };
        job.validated(source.clone());

        // Estimating
        let primary = request.plan.primary().resolve(source.path());
        info!("Measuring {}", primary.display());
        let baseline = match tokio::task::spawn_blocking(move || estimate(&primary)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return Err(abort(&mut job, progress.as_mut(), e)),
            Err(_) => return Err(abort(&mut job, progress.as_mut(), ArchiveError::Interrupted)),
        };
        job.estimated(baseline);
        debug!("Progress baseline: {} bytes", baseline);

        // Streaming
        info!(
            "Writing {} archive to {}",
            request.options.format,
            job.output_path().display()
        );
        progress.on_start(baseline);

        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
        let writer = ArchiveWriter::new(
            source.path(),
            job.rules().to_vec(),
            request.options,
        );
        let handle = tokio::task::spawn_blocking(move || {
            let mut emit = |event: ArchiveEvent| {
                // A dropped receiver means the coordinator already resolved.
                let _ = tx.blocking_send(PipelineEvent::Writer(event));
            };
            if let Some(stream) = writer.write_to(&mut sink, &mut emit) {
                let signal = sink.close_signal(stream);
                let _ = tx.blocking_send(PipelineEvent::Sink(signal));
            }
        });

        let mut completed: Option<WriteSummary> = None;
        let mut closed: Option<u64> = None;
        let mut failure: Option<ArchiveError> = None;

        while let Some(event) = rx.recv().await {
            match event {
                PipelineEvent::Writer(ArchiveEvent::Progress { processed, .. }) => {
                    let processed = job.record_progress(processed);
                    progress.on_progress(processed, baseline);
                }
                PipelineEvent::Writer(ArchiveEvent::Warning(warning)) => {
                    warn!("{}", warning);
                    progress.on_warning(&warning);
                    job.record_warning(warning);
                }
                PipelineEvent::Writer(ArchiveEvent::EntryAdded { name, bytes, .. }) => {
                    debug!("Archived {} ({} bytes)", name, bytes);
                }
                PipelineEvent::Writer(ArchiveEvent::Completed(summary)) => {
                    debug!(
                        "Writer finished: {} files, {} directories",
                        summary.files, summary.directories
                    );
                    completed = Some(summary);
                }
                PipelineEvent::Writer(ArchiveEvent::Failed(e)) => {
                    failure = Some(e);
                    break;
                }
                PipelineEvent::Sink(SinkSignal::Closed { bytes }) => {
                    // Only a close after the writer finished counts.
                    if completed.is_some() {
                        closed = Some(bytes);
                        break;
                    }
                }
                PipelineEvent::Sink(SinkSignal::Error(e)) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        drop(rx);

        // Wait for the writer thread so the output handle is released.
        if handle.await.is_err() && failure.is_none() && closed.is_none() {
            failure = Some(ArchiveError::Interrupted);
        }

        let (summary, archive_bytes) = match (failure, completed, closed) {
            (Some(e), _, _) => return Err(abort(&mut job, progress.as_mut(), e)),
            (None, Some(summary), Some(bytes)) => (summary, bytes),
            _ => {
                return Err(abort(
                    &mut job,
                    progress.as_mut(),
                    ArchiveError::Interrupted,
                ))
            }
        };

        job.succeed();
        progress.on_finish(true);
        info!("{} total bytes", archive_bytes);
        info!("Archive has been finalized and the output file has been closed");

        Ok(ArchiveReport {
            archive_path: job.output_path().to_path_buf(),
            format: request.options.format,
            files: summary.files,
            directories: summary.directories,
            processed_bytes: job.processed_bytes(),
            baseline_bytes: job.baseline_bytes(),
            archive_bytes,
            warnings: job.warnings().to_vec(),
            duration_seconds: started.elapsed().as_secs_f64(),
        })
    }
}

fn validate<S: OutputSink>(request: &ArchiveRequest, sink: &mut S) -> Result<SourceDirectory> {
    let source = SourceDirectory::validate(&request.source_dir)?;
    sink.prepare()?;
    Ok(source)
}

fn abort(
    job: &mut ArchiveJob,
    progress: &mut dyn ProgressReporter,
    error: ArchiveError,
) -> ArchiveError {
    debug!("Job failed in {} state: {}", job.state(), error);
    job.fail(&error);
    progress.on_finish(false);
    error
}

/// What a run would include, without writing anything.
#[derive(Debug, Clone)]
pub struct Preview {
    pub source: SourceDirectory,
    /// Each rule with whether its source is currently present
    pub rules: Vec<(InclusionRule, bool)>,
    pub baseline_bytes: u64,
}

impl Preview {
    /// Required rules whose source is absent.
    pub fn missing_required(&self) -> impl Iterator<Item = &InclusionRule> {
        self.rules
            .iter()
            .filter(|(rule, present)| rule.required && !present)
            .map(|(rule, _)| rule)
    }
}

/// Validates the source and measures the baseline for a dry run.
pub fn preview(request: &ArchiveRequest) -> Result<Preview> {
    let source = SourceDirectory::validate(&request.source_dir)?;
    let rules = request
        .plan
        .rules()
        .iter()
        .map(|rule| {
            let present = source_present(&rule.resolve(source.path()), rule.kind);
            (rule.clone(), present)
        })
        .collect();

    let primary = request.plan.primary().resolve(source.path());
    let baseline_bytes = if primary.is_dir() { estimate(&primary)? } else { 0 };

    Ok(Preview {
        source,
        rules,
        baseline_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::plan::{SAVES_DIR, SETTINGS_DIR};
    use crate::progress::RecordingProgress;
    use crate::sink::MemorySink;
    use std::fs;
    use tempfile::TempDir;
    use vrbackup_core::MARKER_FILE;

    fn server_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join(MARKER_FILE), b"MZ").unwrap();
        fs::create_dir_all(root.join(SETTINGS_DIR)).unwrap();
        fs::create_dir_all(root.join(SAVES_DIR)).unwrap();
        fs::write(root.join("run.bat"), b"0123456789").unwrap();
        fs::write(root.join(SETTINGS_DIR).join("config.json"), vec![b'x'; 50]).unwrap();
        fs::write(root.join(SAVES_DIR).join("world1.sav"), vec![1u8; 1000]).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_run_into_memory() {
        let tree = server_tree();
        let sink = MemorySink::new("out.zip");
        let progress = RecordingProgress::new();

        let report = Pipeline::new(ArchiveRequest::new(tree.path()), sink.clone())
            .with_progress(progress.clone())
            .run()
            .await
            .unwrap();

        assert!(sink.is_closed());
        assert_eq!(report.baseline_bytes, 1000);
        assert_eq!(report.processed_bytes, 1060);
        assert_eq!(report.files, 3);
        assert_eq!(report.archive_bytes, sink.contents().unwrap().len() as u64);
        assert!(report.message().contains("out.zip"));

        assert_eq!(progress.baseline(), Some(1000));
        assert_eq!(progress.finished(), Some(true));
        assert_eq!(progress.samples().last(), Some(&(1060, 1000)));
    }

    #[tokio::test]
    async fn test_invalid_source_is_configuration_error() {
        let tree = TempDir::new().unwrap();
        let sink = MemorySink::new("out.zip");
        let progress = RecordingProgress::new();

        let err = Pipeline::new(ArchiveRequest::new(tree.path()), sink.clone())
            .with_progress(progress.clone())
            .run()
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!sink.is_closed());
        assert_eq!(progress.finished(), Some(false));
        assert_eq!(progress.baseline(), None);
    }

    #[tokio::test]
    async fn test_missing_saves_fails_while_estimating() {
        let tree = server_tree();
        fs::remove_dir_all(tree.path().join(SAVES_DIR)).unwrap();
        let sink = MemorySink::new("out.zip");

        let err = Pipeline::new(ArchiveRequest::new(tree.path()), sink.clone())
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, ArchiveError::Estimate { .. }));
        assert!(!sink.is_closed());
    }

    #[tokio::test]
    async fn test_optional_file_missing_is_a_warning() {
        let tree = server_tree();
        fs::remove_file(tree.path().join("run.bat")).unwrap();
        let progress = RecordingProgress::new();

        let report = Pipeline::new(ArchiveRequest::new(tree.path()), MemorySink::new("out.zip"))
            .with_progress(progress.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(report.warnings.len(), 1);
        assert_eq!(progress.warnings().len(), 1);
        assert_eq!(report.files, 2);
    }

    #[test]
    fn test_preview_reports_presence() {
        let tree = server_tree();
        fs::remove_file(tree.path().join("run.bat")).unwrap();

        let preview = preview(&ArchiveRequest::new(tree.path())).unwrap();
        assert_eq!(preview.baseline_bytes, 1000);
        assert!(!preview.rules[0].1);
        assert!(preview.rules[1].1 && preview.rules[2].1);
        assert_eq!(preview.missing_required().count(), 0);
    }

    #[test]
    fn test_preview_lists_missing_required() {
        let tree = server_tree();
        fs::remove_dir_all(tree.path().join(SETTINGS_DIR)).unwrap();

        let preview = preview(&ArchiveRequest::new(tree.path())).unwrap();
        let missing: Vec<_> = preview.missing_required().collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].archive_name, SETTINGS_DIR);
    }

    #[test]
    fn test_request_builders() {
        let request = ArchiveRequest::new("/srv")
            .with_format(ArchiveFormat::TarGz)
            .with_compression_level(42);
        assert_eq!(request.options.format, ArchiveFormat::TarGz);
        assert_eq!(request.options.compression_level, 9);
    }
}
