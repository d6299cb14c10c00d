//! Progress reporting for archive operations.
//!
//! The writer reports cumulative source bytes; reporters compare them with
//! the baseline measured before streaming started. The baseline only covers
//! the primary directory, so the processed count routinely overshoots it.
//! Displayed percent is clamped to 100 and remaining time never goes
//! negative.

use crate::error::ArchiveWarning;
use indicatif::{HumanBytes, HumanDuration, ProgressBar, ProgressStyle};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How far back throughput samples are kept for the ETA.
pub const THROUGHPUT_WINDOW: Duration = Duration::from_secs(5);

/// Resolution of the terminal bar.
const BAR_STEPS: u64 = 1000;

/// Receives progress from the pipeline coordinator.
pub trait ProgressReporter: Send {
    /// Streaming is about to start with a fixed baseline.
    fn on_start(&mut self, _baseline: u64) {}

    /// Cumulative processed bytes against the baseline.
    fn on_progress(&mut self, processed: u64, baseline: u64);

    /// A non-fatal condition was reported.
    fn on_warning(&mut self, _warning: &ArchiveWarning) {}

    /// The job reached a terminal state.
    fn on_finish(&mut self, _success: bool) {}
}

/// Percent and estimated remaining time at one point in a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub processed: u64,
    pub baseline: u64,
    /// 0.0 to 100.0
    pub percent: f64,
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    /// `bytes_per_sec` is the recent throughput, if known.
    pub fn compute(processed: u64, baseline: u64, bytes_per_sec: Option<f64>) -> Self {
        let fraction = if baseline == 0 {
            1.0
        } else {
            (processed as f64 / baseline as f64).min(1.0)
        };

        let remaining = baseline.saturating_sub(processed);
        let eta = if remaining == 0 {
            Some(Duration::ZERO)
        } else {
            bytes_per_sec
                .filter(|rate| rate.is_finite() && *rate > 0.0)
                .map(|rate| Duration::from_secs_f64(remaining as f64 / rate))
        };

        Self {
            processed,
            baseline,
            percent: fraction * 100.0,
            eta,
        }
    }
}

/// Sliding window of `(time, cumulative bytes)` samples.
#[derive(Debug, Clone)]
pub struct ThroughputWindow {
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
}

impl ThroughputWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            window,
        }
    }

    pub fn record(&mut self, processed: u64) {
        self.record_at(Instant::now(), processed);
    }

    pub fn record_at(&mut self, at: Instant, processed: u64) {
        self.samples.push_back((at, processed));
        // Always keep two samples so a stalled stream still has a rate.
        while self.samples.len() > 2 {
            match self.samples.front() {
                Some((t, _)) if at.saturating_duration_since(*t) > self.window => {
                    self.samples.pop_front();
                }
                _ => break,
            }
        }
    }

    /// Bytes per second across the window, once two samples are apart in time.
    pub fn rate(&self) -> Option<f64> {
        let (first_t, first_b) = self.samples.front()?;
        let (last_t, last_b) = self.samples.back()?;
        let elapsed = last_t.saturating_duration_since(*first_t).as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }
        Some(last_b.saturating_sub(*first_b) as f64 / elapsed)
    }
}

impl Default for ThroughputWindow {
    fn default() -> Self {
        Self::new(THROUGHPUT_WINDOW)
    }
}

/// Progress bar on the terminal.
#[derive(Debug)]
pub struct TerminalProgress {
    bar: ProgressBar,
    throughput: ThroughputWindow,
}

impl TerminalProgress {
    pub fn new(message: &str) -> Self {
        let bar = ProgressBar::new(BAR_STEPS);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} {prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );
        bar.set_prefix(message.to_string());
        Self {
            bar,
            throughput: ThroughputWindow::default(),
        }
    }

    fn render(&self, snapshot: &ProgressSnapshot) -> String {
        let eta = match snapshot.eta {
            Some(eta) => HumanDuration(eta).to_string(),
            None => "--".to_string(),
        };
        format!(
            "{:>5.1}% {} / {} ETA {}",
            snapshot.percent,
            HumanBytes(snapshot.processed),
            HumanBytes(snapshot.baseline),
            eta
        )
    }
}

impl ProgressReporter for TerminalProgress {
    fn on_start(&mut self, baseline: u64) {
        self.throughput.record(0);
        self.bar.enable_steady_tick(Duration::from_millis(100));
        let snapshot = ProgressSnapshot::compute(0, baseline, None);
        self.bar.set_message(self.render(&snapshot));
    }

    fn on_progress(&mut self, processed: u64, baseline: u64) {
        self.throughput.record(processed);
        let snapshot = ProgressSnapshot::compute(processed, baseline, self.throughput.rate());
        self.bar
            .set_position((snapshot.percent / 100.0 * BAR_STEPS as f64) as u64);
        self.bar.set_message(self.render(&snapshot));
    }

    fn on_finish(&mut self, success: bool) {
        if success {
            self.bar.set_position(BAR_STEPS);
            self.bar.finish_and_clear();
        } else {
            self.bar.abandon();
        }
    }
}

/// Discards everything. Used with `--quiet`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn on_progress(&mut self, _processed: u64, _baseline: u64) {}
}

#[derive(Debug, Default)]
struct Recorded {
    baseline: Option<u64>,
    samples: Vec<(u64, u64)>,
    warnings: Vec<ArchiveWarning>,
    finished: Option<bool>,
}

/// Records every call. Clones share the recording.
#[derive(Debug, Clone, Default)]
pub struct RecordingProgress {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Recorded) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn baseline(&self) -> Option<u64> {
        self.with(|r| r.baseline)
    }

    /// `(processed, baseline)` pairs in arrival order.
    pub fn samples(&self) -> Vec<(u64, u64)> {
        self.with(|r| r.samples.clone())
    }

    pub fn warnings(&self) -> Vec<ArchiveWarning> {
        self.with(|r| r.warnings.clone())
    }

    pub fn finished(&self) -> Option<bool> {
        self.with(|r| r.finished)
    }
}

impl ProgressReporter for RecordingProgress {
    fn on_start(&mut self, baseline: u64) {
        self.with(|r| r.baseline = Some(baseline));
    }

    fn on_progress(&mut self, processed: u64, baseline: u64) {
        self.with(|r| r.samples.push((processed, baseline)));
    }

    fn on_warning(&mut self, warning: &ArchiveWarning) {
        self.with(|r| r.warnings.push(warning.clone()));
    }

    fn on_finish(&mut self, success: bool) {
        self.with(|r| r.finished = Some(success));
    }
}
