//! Size baseline for progress reporting.

use crate::error::{ArchiveError, Result};
use std::path::Path;
use walkdir::WalkDir;

/// Sums the sizes of all regular files under `path`.
///
/// Symbolic links are not followed, so a link pointing back into (or out of)
/// the tree is neither recursed into nor counted.
pub fn estimate(path: &Path) -> Result<u64> {
    let metadata = std::fs::symlink_metadata(path).map_err(|e| ArchiveError::Estimate {
        path: path.to_path_buf(),
        source: e,
    })?;

    if metadata.is_file() {
        return Ok(metadata.len());
    }

    let mut total = 0u64;
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.map_err(|e| ArchiveError::Estimate {
            path: e.path().unwrap_or(path).to_path_buf(),
            source: e.into(),
        })?;

        if entry.file_type().is_file() {
            let len = entry
                .metadata()
                .map_err(|e| ArchiveError::Estimate {
                    path: entry.path().to_path_buf(),
                    source: e.into(),
                })?
                .len();
            total = total.saturating_add(len);
        }
    }

    tracing::debug!("Estimated {} bytes under {}", total, path.display());
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_estimate_sums_nested_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("v3/slot1")).unwrap();
        fs::write(dir.path().join("a.sav"), vec![0u8; 1000]).unwrap();
        fs::write(dir.path().join("v3/slot1/b.sav"), vec![0u8; 234]).unwrap();
        fs::write(dir.path().join("v3/c.json"), b"{}").unwrap();

        assert_eq!(estimate(dir.path()).unwrap(), 1236);
    }

    #[test]
    fn test_estimate_empty_directory() {
        let dir = TempDir::new().unwrap();
        assert_eq!(estimate(dir.path()).unwrap(), 0);
    }

    #[test]
    fn test_estimate_missing_path() {
        let dir = TempDir::new().unwrap();
        let err = estimate(&dir.path().join("save-data/Saves")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("Saves"));
    }

    #[test]
    fn test_estimate_single_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("run.bat");
        fs::write(&file, b"0123456789").unwrap();
        assert_eq!(estimate(&file).unwrap(), 10);
    }

    #[cfg(unix)]
    #[test]
    fn test_estimate_does_not_follow_symlinks() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("big.bin"), vec![0u8; 4096]).unwrap();
        fs::write(dir.path().join("world.sav"), vec![0u8; 100]).unwrap();

        std::os::unix::fs::symlink(outside.path(), dir.path().join("elsewhere")).unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();

        assert_eq!(estimate(dir.path()).unwrap(), 100);
    }
}
