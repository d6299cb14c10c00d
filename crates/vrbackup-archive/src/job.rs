//! Per-invocation job state.
//!
//! A job moves `Validating → Estimating → Streaming` and then to exactly one
//! of `Succeeded` or `Failed`. Terminal states are final; late transitions
//! are refused rather than applied.

use crate::error::{ArchiveError, ArchiveWarning, ErrorKind};
use crate::plan::InclusionRule;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use vrbackup_core::SourceDirectory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Validating,
    Estimating,
    Streaming,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    /// Whether `self → next` is a legal edge.
    pub fn can_transition(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Validating, Estimating)
                | (Estimating, Streaming)
                | (Validating | Estimating | Streaming, Failed)
                | (Streaming, Succeeded)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Validating => "validating",
            JobState::Estimating => "estimating",
            JobState::Streaming => "streaming",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Pending,
    Succeeded(PathBuf),
    Failed { kind: ErrorKind, message: String },
}

/// State of one archive run.
#[derive(Debug)]
pub struct ArchiveJob {
    source: Option<SourceDirectory>,
    output_path: PathBuf,
    rules: Vec<InclusionRule>,
    baseline_bytes: Option<u64>,
    processed_bytes: u64,
    warnings: Vec<ArchiveWarning>,
    state: JobState,
    outcome: JobOutcome,
}

impl ArchiveJob {
    pub fn new(output_path: impl Into<PathBuf>, rules: Vec<InclusionRule>) -> Self {
        Self {
            source: None,
            output_path: output_path.into(),
            rules,
            baseline_bytes: None,
            processed_bytes: 0,
            warnings: Vec::new(),
            state: JobState::Validating,
            outcome: JobOutcome::Pending,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn outcome(&self) -> &JobOutcome {
        &self.outcome
    }

    pub fn source(&self) -> Option<&SourceDirectory> {
        self.source.as_ref()
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn rules(&self) -> &[InclusionRule] {
        &self.rules
    }

    /// Zero until the baseline has been measured.
    pub fn baseline_bytes(&self) -> u64 {
        self.baseline_bytes.unwrap_or(0)
    }

    pub fn processed_bytes(&self) -> u64 {
        self.processed_bytes
    }

    pub fn warnings(&self) -> &[ArchiveWarning] {
        &self.warnings
    }

    fn transition(&mut self, next: JobState) -> bool {
        if !self.state.can_transition(next) {
            tracing::debug!("Ignoring job transition {} -> {}", self.state, next);
            return false;
        }
        tracing::debug!("Job {} -> {}", self.state, next);
        self.state = next;
        true
    }

    /// Validating → Estimating, recording the validated source.
    pub fn validated(&mut self, source: SourceDirectory) -> bool {
        if self.transition(JobState::Estimating) {
            self.source = Some(source);
            true
        } else {
            false
        }
    }

    /// Estimating → Streaming, fixing the baseline for the rest of the run.
    pub fn estimated(&mut self, baseline: u64) -> bool {
        if self.baseline_bytes.is_none() && self.transition(JobState::Streaming) {
            self.baseline_bytes = Some(baseline);
            true
        } else {
            false
        }
    }

    /// Records a cumulative processed count. The counter never goes back.
    pub fn record_progress(&mut self, processed: u64) -> u64 {
        if self.state == JobState::Streaming {
            self.processed_bytes = self.processed_bytes.max(processed);
        }
        self.processed_bytes
    }

    pub fn record_warning(&mut self, warning: ArchiveWarning) {
        if !self.state.is_terminal() {
            self.warnings.push(warning);
        }
    }

    /// Streaming → Succeeded. Returns false if the job already finished.
    pub fn succeed(&mut self) -> bool {
        if self.transition(JobState::Succeeded) {
            self.outcome = JobOutcome::Succeeded(self.output_path.clone());
            true
        } else {
            false
        }
    }

    /// Any live state → Failed. Returns false if the job already finished.
    pub fn fail(&mut self, error: &ArchiveError) -> bool {
        if self.transition(JobState::Failed) {
            self.outcome = JobOutcome::Failed {
                kind: error.kind(),
                message: error.to_string(),
            };
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::InclusionPlan;
    use std::fs;
    use tempfile::TempDir;
    use vrbackup_core::MARKER_FILE;

    fn source() -> (TempDir, SourceDirectory) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(MARKER_FILE), b"MZ").unwrap();
        let source = SourceDirectory::validate(dir.path()).unwrap();
        (dir, source)
    }

    fn job() -> ArchiveJob {
        ArchiveJob::new("out.zip", InclusionPlan::server_default().rules().to_vec())
    }

    #[test]
    fn test_happy_path() {
        let (_dir, source) = source();
        let mut job = job();

        assert_eq!(job.state(), JobState::Validating);
        assert!(job.validated(source));
        assert!(job.estimated(1000));
        assert_eq!(job.baseline_bytes(), 1000);
        assert!(job.succeed());

        assert_eq!(job.state(), JobState::Succeeded);
        assert_eq!(job.outcome(), &JobOutcome::Succeeded(PathBuf::from("out.zip")));
    }

    #[test]
    fn test_terminal_is_final() {
        let (_dir, source) = source();
        let mut job = job();
        job.validated(source);
        job.estimated(10);

        assert!(job.fail(&ArchiveError::compression("bad")));
        assert!(!job.succeed());
        assert!(!job.fail(&ArchiveError::Interrupted));
        assert!(matches!(
            job.outcome(),
            JobOutcome::Failed {
                kind: ErrorKind::Compression,
                ..
            }
        ));
    }

    #[test]
    fn test_cannot_succeed_before_streaming() {
        let mut job = job();
        assert!(!job.succeed());
        assert!(job.fail(&ArchiveError::configuration("no marker")));
        assert_eq!(job.state(), JobState::Failed);
    }

    #[test]
    fn test_baseline_set_once() {
        let (_dir, source) = source();
        let mut job = job();
        job.validated(source);

        assert!(job.estimated(500));
        assert!(!job.estimated(900));
        assert_eq!(job.baseline_bytes(), 500);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let (_dir, source) = source();
        let mut job = job();
        job.validated(source);
        job.estimated(100);

        assert_eq!(job.record_progress(40), 40);
        assert_eq!(job.record_progress(20), 40);
        assert_eq!(job.record_progress(140), 140);
    }

    #[test]
    fn test_progress_ignored_outside_streaming() {
        let mut job = job();
        assert_eq!(job.record_progress(40), 0);
    }

    #[test]
    fn test_transition_table() {
        use JobState::*;
        assert!(Validating.can_transition(Estimating));
        assert!(!Validating.can_transition(Streaming));
        assert!(!Estimating.can_transition(Succeeded));
        assert!(Streaming.can_transition(Failed));
        assert!(!Succeeded.can_transition(Failed));
        assert!(!Failed.can_transition(Succeeded));
    }
}
