//! Configuration file loading and parsing

use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;

/// Configuration file names to search for
const CONFIG_FILE_NAMES: &[&str] = &["vrbackup.yaml", "vrbackup.yml"];

/// Default archive file name, written to the current directory
pub const DEFAULT_OUTPUT_NAME: &str = "VRisingServerData.zip";

/// Default compression level (6 = balanced speed/ratio)
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// On-disk shape of `vrbackup.yaml`.
///
/// Every field is optional; command-line flags take precedence over
/// anything set here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub struct BackupConfigFile {
    /// Server installation root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_dir: Option<Utf8PathBuf>,

    /// Archive output path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Utf8PathBuf>,

    /// Container format (`zip` or `tar-gz`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Compression level (1-9)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_level: Option<u32>,

    /// Append a timestamp to the default output name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<bool>,
}

/// Loaded backup configuration
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// The parsed configuration
    pub config: BackupConfigFile,

    /// Path to the configuration file, if one was found
    pub config_path: Option<Utf8PathBuf>,

    /// Directory relative paths in the file are resolved against
    pub working_dir: Utf8PathBuf,
}

impl BackupConfig {
    /// Load configuration from the specified path or search for it.
    ///
    /// An explicit path must exist. Without one, a missing file is not an
    /// error and yields the defaults.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self> {
        let found = if let Some(p) = path {
            let content = fs::read_to_string(p).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::config_not_found(p.as_str())
                } else {
                    Error::Io(e)
                }
            })?;
            Some((p.to_owned(), content))
        } else {
            Self::find_config()?
        };

        let Some((config_path, content)) = found else {
            tracing::debug!("No vrbackup.yaml found, using defaults");
            return Ok(Self::default());
        };

        let working_dir = config_path
            .parent()
            .filter(|p| !p.as_str().is_empty())
            .map(|p| p.to_owned())
            .unwrap_or_else(|| Utf8PathBuf::from("."));

        let config = Self::parse(&content)?;
        tracing::debug!("Loaded configuration from {}", config_path);

        Ok(Self {
            config,
            config_path: Some(config_path),
            working_dir,
        })
    }

    /// Parse and sanity-check configuration content.
    pub fn parse(content: &str) -> Result<BackupConfigFile> {
        if content.trim().is_empty() {
            return Ok(BackupConfigFile::default());
        }

        let config: BackupConfigFile = serde_yaml_ng::from_str(content)?;

        if let Some(level) = config.compression_level {
            if !(1..=9).contains(&level) {
                return Err(Error::invalid_config(format!(
                    "compression_level must be 1-9, got {}",
                    level
                )));
            }
        }

        Ok(config)
    }

    /// Find configuration file in current directory or parent directories
    fn find_config() -> Result<Option<(Utf8PathBuf, String)>> {
        let cwd = std::env::current_dir().map_err(Error::Io)?;
        let cwd = Utf8PathBuf::try_from(cwd)
            .map_err(|_| Error::invalid_config("Current directory path is not valid UTF-8"))?;

        Self::find_config_from(&cwd)
    }

    fn find_config_from(start: &Utf8Path) -> Result<Option<(Utf8PathBuf, String)>> {
        let mut current = Some(start);

        while let Some(dir) = current {
            for name in CONFIG_FILE_NAMES {
                let path = dir.join(name);
                if path.is_file() {
                    let content = fs::read_to_string(&path)?;
                    return Ok(Some((path, content)));
                }
            }
            current = dir.parent();
        }

        Ok(None)
    }

    /// Server directory from the file, resolved against the file's location.
    pub fn server_dir(&self) -> Option<Utf8PathBuf> {
        self.config
            .server_dir
            .as_ref()
            .map(|p| self.resolve(p))
    }

    /// Output path from the file, resolved against the file's location.
    pub fn output(&self) -> Option<Utf8PathBuf> {
        self.config.output.as_ref().map(|p| self.resolve(p))
    }

    /// Compression level from the file or the default.
    pub fn compression_level(&self) -> u32 {
        self.config
            .compression_level
            .unwrap_or(DEFAULT_COMPRESSION_LEVEL)
    }

    fn resolve(&self, path: &Utf8Path) -> Utf8PathBuf {
        if path.is_absolute() {
            path.to_owned()
        } else {
            self.working_dir.join(path)
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            config: BackupConfigFile::default(),
            config_path: None,
            working_dir: Utf8PathBuf::from("."),
        }
    }
}
