//! # vrbackup-core
//!
//! Core library for vrbackup providing:
//! - Configuration file parsing (vrbackup.yaml)
//! - V Rising Dedicated Server installation layout and validation
//! - Installation discovery from flags, config, environment and Steam

pub mod config;
pub mod discovery;
pub mod error;
pub mod install;

pub use config::{BackupConfig, BackupConfigFile, DEFAULT_COMPRESSION_LEVEL, DEFAULT_OUTPUT_NAME};
pub use discovery::{Candidate, CandidateOrigin, InstallLocator, Located, Rejection};
pub use error::{Error, Result};
pub use install::{SourceDirectory, MARKER_FILE, SERVER_DIR_NAME};
