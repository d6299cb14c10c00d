//! Error types for vrbackup-core

use thiserror::Error;

/// Result type alias using vrbackup-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for vrbackup
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {message}")]
    InvalidConfig { message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Server directory does not exist
    #[error("Server directory not found: {path}")]
    SourceNotFound { path: String },

    /// Server path exists but is not a directory
    #[error("Server path is not a directory: {path}")]
    NotADirectory { path: String },

    /// Directory exists but is not a V Rising server installation
    #[error("'{marker}' not found in {path}. Are you sure the V Rising Dedicated Server is installed there?")]
    MarkerMissing { path: String, marker: String },

    /// No candidate location held a valid installation
    #[error("V Rising Dedicated Server installation not found. Tried:\n{tried}")]
    InstallNotFound { tried: String },
}

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a source not found error
    pub fn source_not_found(path: impl Into<String>) -> Self {
        Self::SourceNotFound { path: path.into() }
    }

    /// Create a not-a-directory error
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory { path: path.into() }
    }

    /// Create a marker missing error
    pub fn marker_missing(path: impl Into<String>, marker: impl Into<String>) -> Self {
        Self::MarkerMissing {
            path: path.into(),
            marker: marker.into(),
        }
    }

    /// Create an installation-not-found error from a list of rejected candidates
    pub fn install_not_found(tried: Vec<String>) -> Self {
        let tried = if tried.is_empty() {
            "  (no candidate locations)".to_string()
        } else {
            tried
                .iter()
                .map(|t| format!("  - {}", t))
                .collect::<Vec<_>>()
                .join("\n")
        };
        Self::InstallNotFound { tried }
    }
}
