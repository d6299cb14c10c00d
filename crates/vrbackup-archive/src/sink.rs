//! Output sinks: where the compressed byte stream ends up.
//!
//! A sink is opened once, written through its stream, then closed. Only a
//! successful [`OutputSink::close`] means the archive is durably stored; an
//! archive whose stream was merely finished is not yet a success.

use crate::error::{ArchiveError, Result};
use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Size of the buffered writer in front of the output file. Once full, the
/// archive writer blocks on the disk and stops reading sources.
pub const SINK_BUFFER_SIZE: usize = 256 * 1024;

/// Terminal signal from a sink.
#[derive(Debug)]
pub enum SinkSignal {
    /// All bytes flushed and the handle released
    Closed { bytes: u64 },
    /// Flushing or releasing the destination failed
    Error(ArchiveError),
}

/// A writable destination for an archive.
pub trait OutputSink: Send + 'static {
    /// Stream the container is written into.
    type Stream: Write + Seek + Send;

    /// Where the archive is being written, for messages and errors.
    fn location(&self) -> &Path;

    /// Makes the destination writable, e.g. by creating parent directories.
    fn prepare(&mut self) -> Result<()>;

    /// Opens the destination stream.
    fn open(&mut self) -> Result<Self::Stream>;

    /// Flushes and releases the stream, returning the bytes stored.
    fn close(&mut self, stream: Self::Stream) -> Result<u64>;

    /// Runs [`close`](Self::close) and converts the outcome to a signal.
    fn close_signal(&mut self, stream: Self::Stream) -> SinkSignal {
        match self.close(stream) {
            Ok(bytes) => SinkSignal::Closed { bytes },
            Err(e) => SinkSignal::Error(e),
        }
    }
}

/// Archive file on disk.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl OutputSink for FileSink {
    type Stream = BufWriter<File>;

    fn location(&self) -> &Path {
        &self.path
    }

    fn prepare(&mut self) -> Result<()> {
        let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) else {
            return Ok(());
        };

        if !parent.exists() {
            tracing::info!("Creating output directory {}", parent.display());
        }
        std::fs::create_dir_all(parent).map_err(|e| ArchiveError::OutputDir {
            path: parent.to_path_buf(),
            source: e,
        })
    }

    fn open(&mut self) -> Result<Self::Stream> {
        let file = File::create(&self.path).map_err(|e| ArchiveError::sink(&self.path, e))?;
        Ok(BufWriter::with_capacity(SINK_BUFFER_SIZE, file))
    }

    fn close(&mut self, stream: Self::Stream) -> Result<u64> {
        let file = stream
            .into_inner()
            .map_err(|e| ArchiveError::sink(&self.path, e.into_error()))?;
        file.sync_all()
            .map_err(|e| ArchiveError::sink(&self.path, e))?;
        let bytes = file
            .metadata()
            .map_err(|e| ArchiveError::sink(&self.path, e))?
            .len();
        drop(file);

        tracing::debug!("Closed {} ({} bytes)", self.path.display(), bytes);
        Ok(bytes)
    }
}

/// In-memory sink. Clones share the same buffer, so a test can keep one
/// handle and inspect the archive after the pipeline consumed the other.
#[derive(Debug, Clone)]
pub struct MemorySink {
    name: PathBuf,
    contents: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemorySink {
    pub fn new(name: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            contents: Arc::new(Mutex::new(None)),
        }
    }

    /// Archive bytes, available once the sink has been closed.
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.contents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_closed(&self) -> bool {
        self.contents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl OutputSink for MemorySink {
    type Stream = Cursor<Vec<u8>>;

    fn location(&self) -> &Path {
        &self.name
    }

    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    fn open(&mut self) -> Result<Self::Stream> {
        Ok(Cursor::new(Vec::new()))
    }

    fn close(&mut self, mut stream: Self::Stream) -> Result<u64> {
        stream
            .flush()
            .map_err(|e| ArchiveError::sink(&self.name, e))?;
        let bytes = stream.into_inner();
        let len = bytes.len() as u64;
        *self.contents.lock().unwrap_or_else(|e| e.into_inner()) = Some(bytes);
        Ok(len)
    }
}
