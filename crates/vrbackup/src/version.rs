//! Version information for the vrbackup CLI

use serde::Serialize;

/// Version information
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    /// CLI version
    pub version: String,

    /// Archive library version
    pub archive: String,

    /// Target triple
    pub target: Option<String>,
}

impl VersionInfo {
    /// Create version info for current build
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            archive: vrbackup_archive::VERSION.to_string(),
            target: option_env!("TARGET").map(String::from),
        }
    }

    /// Format as display string
    pub fn display(&self) -> String {
        let mut parts = vec![format!("vrbackup {}", self.version)];

        if let Some(target) = &self.target {
            parts.push(target.clone());
        }

        parts.join(" ")
    }
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}
