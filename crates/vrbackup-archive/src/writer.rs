//! Streaming archive writer.
//!
//! Walks the inclusion rules in order and streams every selected file
//! through the container encoder into the sink's stream. Nothing is
//! buffered beyond one read chunk and the sink's write buffer, so a slow
//! destination stalls reading instead of growing memory.
//!
//! Every run emits exactly one terminal event: [`ArchiveEvent::Completed`]
//! after the container trailer has been written, or [`ArchiveEvent::Failed`]
//! at the first fatal error.

use crate::error::{ArchiveError, ArchiveWarning, Result};
use crate::format::{clamp_level, ArchiveFormat, DEFAULT_COMPRESSION_LEVEL};
use crate::plan::{InclusionRule, RuleKind};
use crate::sink::OutputSink;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Progress is reported at least this often while a file is being read.
pub const PROGRESS_STEP: u64 = 64 * 1024;

/// Events emitted while the archive is written.
#[derive(Debug)]
pub enum ArchiveEvent {
    /// Non-fatal condition
    Warning(ArchiveWarning),
    /// An entry was written to the container
    EntryAdded {
        name: String,
        kind: RuleKind,
        bytes: u64,
    },
    /// Source bytes consumed; `processed` is cumulative
    Progress { delta: u64, processed: u64 },
    /// All rules processed and the container trailer written
    Completed(WriteSummary),
    /// First fatal error; nothing follows
    Failed(ArchiveError),
}

impl ArchiveEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ArchiveEvent::Completed(_) | ArchiveEvent::Failed(_))
    }
}

/// Totals for a finished write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub files: usize,
    pub directories: usize,
    pub processed_bytes: u64,
    pub warnings: usize,
}

impl WriteSummary {
    pub fn entries(&self) -> usize {
        self.files + self.directories
    }
}

/// Container and compression settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterOptions {
    pub format: ArchiveFormat,
    pub compression_level: u32,
}

impl WriterOptions {
    pub fn new(format: ArchiveFormat) -> Self {
        Self {
            format,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = clamp_level(level);
        self
    }
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self::new(ArchiveFormat::default())
    }
}

/// Streams inclusion rules rooted at one directory into a container.
#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    root: PathBuf,
    rules: Vec<InclusionRule>,
    options: WriterOptions,
}

impl ArchiveWriter {
    pub fn new(root: impl Into<PathBuf>, rules: Vec<InclusionRule>, options: WriterOptions) -> Self {
        Self {
            root: root.into(),
            rules,
            options,
        }
    }

    /// Fails if any required rule's source is absent or of the wrong kind.
    ///
    /// Runs before the sink is opened, so a missing required directory
    /// never leaves an output file behind.
    pub fn check_required(&self) -> Result<()> {
        for rule in self.rules.iter().filter(|r| r.required) {
            let path = rule.resolve(&self.root);
            if !source_present(&path, rule.kind) {
                return Err(ArchiveError::MissingRequired { path });
            }
        }
        Ok(())
    }

    /// Checks required sources, opens the sink and streams every rule.
    ///
    /// On success the finished stream is returned so the caller can close
    /// the sink; the terminal event has already been emitted either way.
    pub fn write_to<S: OutputSink>(
        &self,
        sink: &mut S,
        emit: &mut dyn FnMut(ArchiveEvent),
    ) -> Option<S::Stream> {
        let location = sink.location().to_path_buf();
        let result = self
            .check_required()
            .and_then(|_| sink.open())
            .and_then(|stream| self.write(stream, &location, emit));

        match result {
            Ok((stream, summary)) => {
                emit(ArchiveEvent::Completed(summary));
                Some(stream)
            }
            Err(e) => {
                emit(ArchiveEvent::Failed(e));
                None
            }
        }
    }

    /// Streams every rule into `stream`, returning it once the container
    /// trailer is written. Emits no terminal event.
    pub fn write<W: Write + Seek>(
        &self,
        stream: W,
        location: &Path,
        emit: &mut dyn FnMut(ArchiveEvent),
    ) -> Result<(W, WriteSummary)> {
        let mut container = Container::new(stream, self.options, location);
        let mut summary = WriteSummary::default();

        match self.write_rules(&mut container, &mut summary, emit) {
            Ok(()) => {
                let stream = container.finish()?;
                Ok((stream, summary))
            }
            Err(e) => {
                // The encoders finalize on drop; keep that from completing
                // an archive that is missing entries.
                container.seal();
                Err(e)
            }
        }
    }

    fn write_rules<W: Write + Seek>(
        &self,
        container: &mut Container<W>,
        summary: &mut WriteSummary,
        emit: &mut dyn FnMut(ArchiveEvent),
    ) -> Result<()> {
        for rule in &self.rules {
            let path = rule.resolve(&self.root);

            if !source_present(&path, rule.kind) {
                if rule.required {
                    return Err(ArchiveError::MissingRequired { path });
                }
                summary.warnings += 1;
                emit(ArchiveEvent::Warning(ArchiveWarning::MissingOptional {
                    path,
                    archive_name: rule.archive_name.clone(),
                }));
                continue;
            }

            match rule.kind {
                RuleKind::File => {
                    container.add_file(&path, &rule.archive_name, summary, emit)?;
                }
                RuleKind::Directory => {
                    self.write_directory(container, &path, rule, summary, emit)?;
                }
            }
        }
        Ok(())
    }

    fn write_directory<W: Write + Seek>(
        &self,
        container: &mut Container<W>,
        dir: &Path,
        rule: &InclusionRule,
        summary: &mut WriteSummary,
        emit: &mut dyn FnMut(ArchiveEvent),
    ) -> Result<()> {
        let walker = WalkDir::new(dir).follow_links(false).sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(|e| ArchiveError::Read {
                path: e.path().unwrap_or(dir).to_path_buf(),
                source: e.into(),
            })?;

            let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            let name = archive_name(&rule.archive_name, relative, entry.path())?;
            let file_type = entry.file_type();

            if file_type.is_dir() {
                container.add_directory(&name)?;
                summary.directories += 1;
                emit(ArchiveEvent::EntryAdded {
                    name,
                    kind: RuleKind::Directory,
                    bytes: 0,
                });
            } else if file_type.is_file() {
                container.add_file(entry.path(), &name, summary, emit)?;
            } else {
                summary.warnings += 1;
                emit(ArchiveEvent::Warning(ArchiveWarning::SkippedEntry {
                    path: entry.path().to_path_buf(),
                }));
            }
        }
        Ok(())
    }
}

/// Whether `path` exists with the kind a rule expects.
pub(crate) fn source_present(path: &Path, kind: RuleKind) -> bool {
    match std::fs::metadata(path) {
        Ok(m) => match kind {
            RuleKind::File => m.is_file(),
            RuleKind::Directory => m.is_dir(),
        },
        Err(_) => false,
    }
}

/// Archive entry name for `relative` under `base`, always `/`-separated.
///
/// Names that are not valid UTF-8 are refused: a lossy rename would not
/// extract back to the same file and could collide with another entry.
fn archive_name(base: &str, relative: &Path, full: &Path) -> Result<String> {
    let mut name = base.to_string();
    for component in relative.components() {
        let part = component.as_os_str().to_str().ok_or_else(|| {
            ArchiveError::read(
                full,
                io::Error::new(io::ErrorKind::InvalidData, "file name is not valid UTF-8"),
            )
        })?;
        if !name.is_empty() {
            name.push('/');
        }
        name.push_str(part);
    }
    Ok(name)
}

/// Reader that reports consumed bytes in [`PROGRESS_STEP`] batches and
/// remembers whether the failure, if any, came from the source side.
struct ProgressReader<'a, R> {
    inner: R,
    processed: &'a mut u64,
    pending: u64,
    consumed: u64,
    read_failed: bool,
    emit: &'a mut dyn FnMut(ArchiveEvent),
}

impl<'a, R: Read> ProgressReader<'a, R> {
    fn new(inner: R, processed: &'a mut u64, emit: &'a mut dyn FnMut(ArchiveEvent)) -> Self {
        Self {
            inner,
            processed,
            pending: 0,
            consumed: 0,
            read_failed: false,
            emit,
        }
    }

    fn flush_progress(&mut self) {
        if self.pending > 0 {
            *self.processed += self.pending;
            (self.emit)(ArchiveEvent::Progress {
                delta: self.pending,
                processed: *self.processed,
            });
            self.pending = 0;
        }
    }
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(0) => {
                self.flush_progress();
                Ok(0)
            }
            Ok(n) => {
                self.pending += n as u64;
                self.consumed += n as u64;
                if self.pending >= PROGRESS_STEP {
                    self.flush_progress();
                }
                Ok(n)
            }
            Err(e) => {
                self.read_failed = true;
                Err(e)
            }
        }
    }
}

/// Stream that swallows writes once sealed.
struct Sealable<W> {
    inner: W,
    sealed: Arc<AtomicBool>,
}

impl<W: Write> Write for Sealable<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.sealed.load(Ordering::Relaxed) {
            return Ok(buf.len());
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.sealed.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.inner.flush()
    }
}

impl<W: Seek> Seek for Sealable<W> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

enum Container<W: Write + Seek> {
    Zip {
        writer: ZipWriter<Sealable<W>>,
        level: u32,
        location: PathBuf,
        sealed: Arc<AtomicBool>,
    },
    TarGz {
        builder: tar::Builder<GzEncoder<Sealable<W>>>,
        location: PathBuf,
        sealed: Arc<AtomicBool>,
    },
}

impl<W: Write + Seek> Container<W> {
    fn new(stream: W, options: WriterOptions, location: &Path) -> Self {
        let location = location.to_path_buf();
        let sealed = Arc::new(AtomicBool::new(false));
        let stream = Sealable {
            inner: stream,
            sealed: sealed.clone(),
        };
        match options.format {
            ArchiveFormat::Zip => Container::Zip {
                writer: ZipWriter::new(stream),
                level: options.compression_level,
                location,
                sealed,
            },
            ArchiveFormat::TarGz => {
                let encoder = GzEncoder::new(stream, Compression::new(options.compression_level));
                Container::TarGz {
                    builder: tar::Builder::new(encoder),
                    location,
                    sealed,
                }
            }
        }
    }

    fn location(&self) -> &Path {
        match self {
            Container::Zip { location, .. } | Container::TarGz { location, .. } => location,
        }
    }

    /// Drops every later write, including the encoders' drop-time trailers.
    fn seal(&self) {
        match self {
            Container::Zip { sealed, .. } | Container::TarGz { sealed, .. } => {
                sealed.store(true, Ordering::Relaxed)
            }
        }
    }

    fn add_directory(&mut self, name: &str) -> Result<()> {
        match self {
            Container::Zip {
                writer,
                level,
                location,
                ..
            } => writer
                .add_directory(name.to_string(), zip_options(*level).unix_permissions(0o755))
                .map_err(|e| zip_error(location, e)),
            Container::TarGz {
                builder, location, ..
            } => {
                let mut header = tar::Header::new_gnu();
                header.set_entry_type(tar::EntryType::Directory);
                header.set_size(0);
                header.set_mode(0o755);
                header.set_mtime(now_secs());
                builder
                    .append_data(&mut header, format!("{}/", name), io::empty())
                    .map_err(|e| ArchiveError::sink(location.as_path(), e))
            }
        }
    }

    fn add_file(
        &mut self,
        path: &Path,
        name: &str,
        summary: &mut WriteSummary,
        emit: &mut dyn FnMut(ArchiveEvent),
    ) -> Result<()> {
        let file = File::open(path).map_err(|e| ArchiveError::read(path, e))?;
        let metadata = file.metadata().map_err(|e| ArchiveError::read(path, e))?;
        self.add_stream(
            path,
            name,
            file,
            metadata.len(),
            mtime_secs(&metadata),
            summary,
            emit,
        )
    }

    /// Streams exactly `size` bytes of `source` as entry `name`. `path` is
    /// only used to report read failures.
    #[allow(clippy::too_many_arguments)]
    fn add_stream<R: Read>(
        &mut self,
        path: &Path,
        name: &str,
        source: R,
        size: u64,
        mtime: u64,
        summary: &mut WriteSummary,
        emit: &mut dyn FnMut(ArchiveEvent),
    ) -> Result<()> {
        let location = self.location().to_path_buf();

        let copied = {
            let mut reader =
                ProgressReader::new(source.take(size), &mut summary.processed_bytes, emit);

            let result = match self {
                Container::Zip { writer, level, .. } => {
                    let options = zip_options(*level)
                        .unix_permissions(0o644)
                        .large_file(size >= u32::MAX as u64);
                    writer
                        .start_file(name.to_string(), options)
                        .map_err(|e| zip_error(&location, e))?;
                    io::copy(&mut reader, writer)
                }
                Container::TarGz { builder, .. } => {
                    let mut header = tar::Header::new_gnu();
                    header.set_entry_type(tar::EntryType::Regular);
                    header.set_size(size);
                    header.set_mode(0o644);
                    header.set_mtime(mtime);
                    builder
                        .append_data(&mut header, name, &mut reader)
                        .map(|_| reader.consumed)
                }
            };

            reader.flush_progress();
            match result {
                Ok(n) => n,
                Err(e) if reader.read_failed => return Err(ArchiveError::read(path, e)),
                Err(e) => return Err(ArchiveError::sink(location, e)),
            }
        };

        // A file that shrank mid-read would leave a short or misaligned entry.
        if copied != size {
            return Err(ArchiveError::read(
                path,
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("file changed while archiving ({} of {} bytes)", copied, size),
                ),
            ));
        }

        debug!("Added {} ({} bytes)", name, size);
        summary.files += 1;
        emit(ArchiveEvent::EntryAdded {
            name: name.to_string(),
            kind: RuleKind::File,
            bytes: size,
        });
        Ok(())
    }

    fn finish(self) -> Result<W> {
        match self {
            Container::Zip {
                writer, location, ..
            } => writer
                .finish()
                .map(|stream| stream.inner)
                .map_err(|e| zip_error(&location, e)),
            Container::TarGz {
                builder, location, ..
            } => builder
                .into_inner()
                .and_then(|encoder| encoder.finish())
                .map(|stream| stream.inner)
                .map_err(|e| ArchiveError::sink(location, e)),
        }
    }
}

fn zip_options(level: u32) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(level as _))
}

fn zip_error(location: &Path, err: zip::result::ZipError) -> ArchiveError {
    match err {
        zip::result::ZipError::Io(e) => ArchiveError::sink(location, e),
        other => ArchiveError::compression(other.to_string()),
    }
}

fn mtime_secs(metadata: &std::fs::Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or_else(now_secs)
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
