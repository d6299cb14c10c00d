//! Inclusion rules: which parts of a server installation go into the archive.
//!
//! The rule table is plain data. [`InclusionPlan::server_default`] is the
//! fixed table for a V Rising Dedicated Server; tests and callers may build
//! their own plan without touching the streaming code.

use crate::error::{ArchiveError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Optional launcher script at the installation root.
pub const RUN_SCRIPT: &str = "run.bat";

/// Server settings directory.
pub const SETTINGS_DIR: &str = "VRisingServer_Data/StreamingAssets/Settings";

/// Save data directory; the progress baseline.
pub const SAVES_DIR: &str = "save-data/Saves";

/// What a rule points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    File,
    Directory,
}

/// Maps one source-relative path to an archive-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InclusionRule {
    /// Path relative to the installation root
    pub source: PathBuf,

    /// Entry name inside the archive, `/`-separated
    pub archive_name: String,

    pub kind: RuleKind,

    /// Missing required sources are fatal; missing optional ones warn
    pub required: bool,
}

impl InclusionRule {
    /// A file rule.
    pub fn file(source: &str, archive_name: &str, required: bool) -> Self {
        Self {
            source: relative_path(source),
            archive_name: archive_name.trim_matches('/').to_string(),
            kind: RuleKind::File,
            required,
        }
    }

    /// A directory rule.
    pub fn directory(source: &str, archive_name: &str, required: bool) -> Self {
        Self {
            source: relative_path(source),
            archive_name: archive_name.trim_matches('/').to_string(),
            kind: RuleKind::Directory,
            required,
        }
    }

    /// Absolute location of this rule's source under `root`.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        root.join(&self.source)
    }
}

/// Builds a platform path from a `/`-separated relative path.
fn relative_path(path: &str) -> PathBuf {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Ordered inclusion rules plus the primary directory used for progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InclusionPlan {
    rules: Vec<InclusionRule>,
    primary: usize,
}

impl InclusionPlan {
    /// Creates a plan. `primary` must index a directory rule.
    pub fn new(rules: Vec<InclusionRule>, primary: usize) -> Result<Self> {
        match rules.get(primary) {
            Some(rule) if rule.kind == RuleKind::Directory => Ok(Self { rules, primary }),
            Some(rule) => Err(ArchiveError::configuration(format!(
                "primary rule '{}' must be a directory",
                rule.archive_name
            ))),
            None => Err(ArchiveError::configuration(format!(
                "primary rule index {} out of range ({} rules)",
                primary,
                rules.len()
            ))),
        }
    }

    /// The fixed rule table for a V Rising Dedicated Server installation.
    pub fn server_default() -> Self {
        Self {
            rules: vec![
                InclusionRule::file(RUN_SCRIPT, RUN_SCRIPT, false),
                InclusionRule::directory(SETTINGS_DIR, SETTINGS_DIR, true),
                InclusionRule::directory(SAVES_DIR, SAVES_DIR, true),
            ],
            primary: 2,
        }
    }

    /// Rules in archive order.
    pub fn rules(&self) -> &[InclusionRule] {
        &self.rules
    }

    /// The directory whose size is the 100% mark.
    pub fn primary(&self) -> &InclusionRule {
        &self.rules[self.primary]
    }
}

impl Default for InclusionPlan {
    fn default() -> Self {
        Self::server_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_order() {
        let plan = InclusionPlan::server_default();
        let names: Vec<&str> = plan.rules().iter().map(|r| r.archive_name.as_str()).collect();
        assert_eq!(names, vec![RUN_SCRIPT, SETTINGS_DIR, SAVES_DIR]);
    }

    #[test]
    fn test_default_table_kinds() {
        let plan = InclusionPlan::server_default();
        let rules = plan.rules();

        assert_eq!(rules[0].kind, RuleKind::File);
        assert!(!rules[0].required);
        assert!(rules[1..]
            .iter()
            .all(|r| r.kind == RuleKind::Directory && r.required));
    }

    #[test]
    fn test_primary_is_saves() {
        let plan = InclusionPlan::server_default();
        assert_eq!(plan.primary().archive_name, SAVES_DIR);
        assert_eq!(
            plan.primary().source,
            Path::new("save-data").join("Saves")
        );
    }

    #[test]
    fn test_resolve_joins_root() {
        let rule = InclusionRule::directory(SETTINGS_DIR, SETTINGS_DIR, true);
        let root = Path::new("/srv/server");
        assert_eq!(
            rule.resolve(root),
            root.join("VRisingServer_Data")
                .join("StreamingAssets")
                .join("Settings")
        );
    }

    #[test]
    fn test_archive_name_trimmed() {
        let rule = InclusionRule::directory("data/", "/backup/data/", true);
        assert_eq!(rule.archive_name, "backup/data");
        assert_eq!(rule.source, PathBuf::from("data"));
    }

    #[test]
    fn test_primary_must_be_directory() {
        let rules = vec![InclusionRule::file("a.txt", "a.txt", true)];
        assert!(InclusionPlan::new(rules.clone(), 0).is_err());
        assert!(InclusionPlan::new(rules, 3).is_err());
    }
}
