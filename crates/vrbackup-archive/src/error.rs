//! Errors and warnings raised while building an archive.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for the archive pipeline
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Broad classification of a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Bad source directory or output location; nothing was written
    Configuration,
    /// Read failure on an input or write failure on the output
    Io,
    /// The container layer reported an internal fault
    Compression,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Configuration => "configuration error",
            ErrorKind::Io => "I/O error",
            ErrorKind::Compression => "compression error",
        };
        write!(f, "{}", s)
    }
}

/// Fatal pipeline errors. The first one raised ends the job.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    #[error("Invalid server directory: {0}")]
    InvalidSource(#[from] vrbackup_core::Error),

    #[error("Cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to measure {path}: {source}")]
    Estimate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Required path is missing: {path}")]
    MissingRequired { path: PathBuf },

    #[error("Failed to write archive {path}: {source}")]
    Sink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Compression failed: {message}")]
    Compression { message: String },

    #[error("Archive writer stopped without reporting an outcome")]
    Interrupted,
}

impl ArchiveError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a read error for `path`
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Create a sink write error for `path`
    pub fn sink(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Sink {
            path: path.into(),
            source,
        }
    }

    /// Create a compression error
    pub fn compression(message: impl Into<String>) -> Self {
        Self::Compression {
            message: message.into(),
        }
    }

    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArchiveError::Configuration { .. }
            | ArchiveError::InvalidSource(_)
            | ArchiveError::OutputDir { .. } => ErrorKind::Configuration,
            ArchiveError::Estimate { .. }
            | ArchiveError::Read { .. }
            | ArchiveError::MissingRequired { .. }
            | ArchiveError::Sink { .. }
            | ArchiveError::Interrupted => ErrorKind::Io,
            ArchiveError::Compression { .. } => ErrorKind::Compression,
        }
    }
}

/// Non-fatal conditions. Surfaced for visibility; never change the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ArchiveWarning {
    /// An optional inclusion's source was absent and was skipped
    MissingOptional { path: PathBuf, archive_name: String },

    /// A directory entry that is neither a file nor a directory, such as a
    /// symlink, was left out
    SkippedEntry { path: PathBuf },
}

impl fmt::Display for ArchiveWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveWarning::MissingOptional { path, archive_name } => write!(
                f,
                "Optional '{}' not found at {}, skipping",
                archive_name,
                path.display()
            ),
            ArchiveWarning::SkippedEntry { path } => write!(
                f,
                "Skipped {}: not a regular file or directory",
                path.display()
            ),
        }
    }
}
