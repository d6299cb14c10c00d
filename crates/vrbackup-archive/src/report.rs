//! Result of a successful archive run.

use crate::error::ArchiveWarning;
use crate::format::ArchiveFormat;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveReport {
    /// Path of the written archive
    pub archive_path: PathBuf,

    pub format: ArchiveFormat,

    /// Files written
    pub files: usize,

    /// Directory entries written
    pub directories: usize,

    /// Source bytes streamed into the archive
    pub processed_bytes: u64,

    /// Size of the primary directory measured before streaming
    pub baseline_bytes: u64,

    /// Size of the archive on disk
    pub archive_bytes: u64,

    pub warnings: Vec<ArchiveWarning>,

    pub duration_seconds: f64,
}

impl ArchiveReport {
    pub fn entries(&self) -> usize {
        self.files + self.directories
    }

    /// Confirmation naming the archive file and the directory it is in.
    pub fn message(&self) -> String {
        let name = self
            .archive_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.archive_path.display().to_string());

        match self
            .archive_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            Some(dir) => format!("Archive {} written to {}", name, dir.display()),
            None => format!("Archive {} written to the current directory", name),
        }
    }

    /// Percentage saved relative to the processed source bytes.
    pub fn compression_percentage(&self) -> u8 {
        if self.processed_bytes == 0 {
            return 0;
        }
        let ratio = self.archive_bytes as f64 / self.processed_bytes as f64;
        ((1.0 - ratio).clamp(0.0, 1.0) * 100.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(path: &str) -> ArchiveReport {
        ArchiveReport {
            archive_path: PathBuf::from(path),
            format: ArchiveFormat::Zip,
            files: 3,
            directories: 2,
            processed_bytes: 1000,
            baseline_bytes: 800,
            archive_bytes: 300,
            warnings: vec![],
            duration_seconds: 0.5,
        }
    }

    #[test]
    fn test_message_names_file_and_directory() {
        let msg = report("/backups/out.zip").message();
        assert_eq!(msg, "Archive out.zip written to /backups");
    }

    #[test]
    fn test_message_bare_file_name() {
        let msg = report("out.zip").message();
        assert_eq!(msg, "Archive out.zip written to the current directory");
    }

    #[test]
    fn test_compression_percentage() {
        assert_eq!(report("out.zip").compression_percentage(), 70);

        let mut grown = report("out.zip");
        grown.archive_bytes = 1500;
        assert_eq!(grown.compression_percentage(), 0);

        let mut empty = report("out.zip");
        empty.processed_bytes = 0;
        assert_eq!(empty.compression_percentage(), 0);
    }

    #[test]
    fn test_entries() {
        assert_eq!(report("out.zip").entries(), 5);
    }

    #[test]
    fn test_serializes_to_json() {
        let json = serde_json::to_value(report("/b/out.zip")).unwrap();
        assert_eq!(json["format"], "zip");
        assert_eq!(json["archive_bytes"], 300);
    }
}
