//! V Rising Dedicated Server installation layout.

use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// Executable whose presence identifies a server installation root.
pub const MARKER_FILE: &str = "VRisingServer.exe";

/// Directory name Steam installs the dedicated server under.
pub const SERVER_DIR_NAME: &str = "VRisingDedicatedServer";

/// A validated server installation root.
///
/// Can only be constructed through [`SourceDirectory::validate`], so holding
/// one means the marker executable was present at validation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDirectory {
    root: PathBuf,
}

impl SourceDirectory {
    /// Checks that `path` is an existing directory containing [`MARKER_FILE`].
    pub fn validate(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::source_not_found(display));
            }
            Err(e) => return Err(Error::Io(e)),
        };

        if !metadata.is_dir() {
            return Err(Error::not_a_directory(display));
        }

        let marker = path.join(MARKER_FILE);
        match std::fs::metadata(&marker) {
            Ok(m) if m.is_file() => {}
            _ => return Err(Error::marker_missing(display, MARKER_FILE)),
        }

        let root = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        Ok(Self { root })
    }

    /// Absolute path of the installation root.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Joins a source-relative path onto the root.
    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }
}

impl fmt::Display for SourceDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root.display())
    }
}

impl AsRef<Path> for SourceDirectory {
    fn as_ref(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_validate_accepts_marker() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(MARKER_FILE), b"MZ").unwrap();

        let source = SourceDirectory::validate(dir.path()).unwrap();
        assert!(source.path().is_absolute());
        assert_eq!(source.join("run.bat"), source.path().join("run.bat"));
    }

    #[test]
    fn test_validate_missing_directory() {
        let dir = TempDir::new().unwrap();
        let err = SourceDirectory::validate(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::SourceNotFound { .. }));
    }

    #[test]
    fn test_validate_rejects_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, b"x").unwrap();

        let err = SourceDirectory::validate(&file).unwrap_err();
        assert!(matches!(err, Error::NotADirectory { .. }));
    }

    #[test]
    fn test_validate_without_marker() {
        let dir = TempDir::new().unwrap();
        let err = SourceDirectory::validate(dir.path()).unwrap_err();
        assert!(matches!(err, Error::MarkerMissing { .. }));
    }

    #[test]
    fn test_marker_must_be_a_file() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(MARKER_FILE)).unwrap();

        let err = SourceDirectory::validate(dir.path()).unwrap_err();
        assert!(matches!(err, Error::MarkerMissing { .. }));
    }
}
