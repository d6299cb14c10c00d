//! Container formats and compression settings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub use vrbackup_core::DEFAULT_COMPRESSION_LEVEL;

/// Container written to the output sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveFormat {
    /// ZIP with deflate
    #[default]
    Zip,
    /// tar stream wrapped in gzip
    TarGz,
}

impl ArchiveFormat {
    /// Infers the format from a file name's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else {
            None
        }
    }

    /// Canonical file extension, without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }

    /// All supported formats.
    pub fn all() -> [ArchiveFormat; 2] {
        [ArchiveFormat::Zip, ArchiveFormat::TarGz]
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveFormat::Zip => write!(f, "zip"),
            ArchiveFormat::TarGz => write!(f, "tar-gz"),
        }
    }
}

impl FromStr for ArchiveFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zip" => Ok(ArchiveFormat::Zip),
            "tar-gz" | "tar.gz" | "targz" | "tgz" => Ok(ArchiveFormat::TarGz),
            _ => Err(format!(
                "Unknown archive format '{}'. Valid formats: zip, tar-gz",
                s
            )),
        }
    }
}

/// Clamps a compression level into 1-9.
pub fn clamp_level(level: u32) -> u32 {
    level.clamp(1, 9)
}
