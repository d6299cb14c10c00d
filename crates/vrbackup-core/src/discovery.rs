//! Server installation discovery.
//!
//! Candidates are tried in order: explicit locations (command-line flag,
//! then configuration file), the `VRISING_SERVER_DIR` environment variable,
//! then the dedicated server directory under every known Steam root. The
//! first candidate that passes [`SourceDirectory::validate`] wins. An invalid
//! explicit location is only a warning as long as some later candidate
//! validates.

use crate::error::{Error, Result};
use crate::install::{SourceDirectory, SERVER_DIR_NAME};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming the server installation root.
pub const SERVER_DIR_ENV: &str = "VRISING_SERVER_DIR";

/// Environment variable naming a Steam installation root.
pub const STEAM_DIR_ENV: &str = "STEAM_DIR";

/// Where a candidate location came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOrigin {
    /// `--server-dir` on the command line
    Flag,
    /// `server_dir` in vrbackup.yaml
    ConfigFile,
    /// `VRISING_SERVER_DIR`
    Environment,
    /// Derived from a Steam library root
    Steam,
}

impl CandidateOrigin {
    /// Whether the user named this location directly.
    pub fn is_explicit(&self) -> bool {
        matches!(self, CandidateOrigin::Flag | CandidateOrigin::ConfigFile)
    }
}

impl fmt::Display for CandidateOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CandidateOrigin::Flag => "--server-dir",
            CandidateOrigin::ConfigFile => "config file",
            CandidateOrigin::Environment => SERVER_DIR_ENV,
            CandidateOrigin::Steam => "steam library",
        };
        write!(f, "{}", s)
    }
}

/// A location that might hold the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub origin: CandidateOrigin,
    pub path: PathBuf,
}

/// A candidate that failed validation, with the reason.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub candidate: Candidate,
    pub reason: String,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {}",
            self.candidate.path.display(),
            self.candidate.origin,
            self.reason
        )
    }
}

/// Outcome of a successful discovery.
#[derive(Debug, Clone)]
pub struct Located {
    pub source: SourceDirectory,
    pub origin: CandidateOrigin,
    pub rejected: Vec<Rejection>,
}

/// Finds the server installation from explicit and automatic locations.
#[derive(Debug, Clone, Default)]
pub struct InstallLocator {
    explicit: Vec<Candidate>,
    environment: Option<PathBuf>,
    steam_roots: Vec<PathBuf>,
}

impl InstallLocator {
    /// Creates a locator with no candidates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a locator seeded from the environment and the platform's
    /// usual Steam install locations.
    pub fn from_env() -> Self {
        let environment = std::env::var_os(SERVER_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let mut steam_roots = Vec::new();
        if let Some(dir) = std::env::var_os(STEAM_DIR_ENV).filter(|v| !v.is_empty()) {
            steam_roots.push(PathBuf::from(dir));
        }
        steam_roots.extend(default_steam_roots());

        Self {
            explicit: Vec::new(),
            environment,
            steam_roots,
        }
    }

    /// Adds the command-line location.
    pub fn with_flag(mut self, path: Option<impl Into<PathBuf>>) -> Self {
        if let Some(path) = path {
            self.explicit.push(Candidate {
                origin: CandidateOrigin::Flag,
                path: path.into(),
            });
        }
        self
    }

    /// Adds the configuration file location.
    pub fn with_config(mut self, path: Option<impl Into<PathBuf>>) -> Self {
        if let Some(path) = path {
            self.explicit.push(Candidate {
                origin: CandidateOrigin::ConfigFile,
                path: path.into(),
            });
        }
        self
    }

    /// Replaces the Steam roots searched for the server directory.
    pub fn with_steam_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.steam_roots = roots;
        self
    }

    /// All candidates in the order they are tried, without duplicates.
    pub fn candidates(&self) -> Vec<Candidate> {
        let mut out: Vec<Candidate> = Vec::new();
        let automatic = self
            .environment
            .iter()
            .map(|p| Candidate {
                origin: CandidateOrigin::Environment,
                path: p.clone(),
            })
            .chain(self.steam_roots.iter().map(|root| Candidate {
                origin: CandidateOrigin::Steam,
                path: steam_server_dir(root),
            }));

        for candidate in self.explicit.iter().cloned().chain(automatic) {
            if !out.iter().any(|c| c.path == candidate.path) {
                out.push(candidate);
            }
        }
        out
    }

    /// Returns the first candidate that validates.
    pub fn locate(&self) -> Result<Located> {
        let mut rejected = Vec::new();

        for candidate in self.candidates() {
            match SourceDirectory::validate(&candidate.path) {
                Ok(source) => {
                    debug!(
                        "Using server directory {} (from {})",
                        source, candidate.origin
                    );
                    return Ok(Located {
                        source,
                        origin: candidate.origin,
                        rejected,
                    });
                }
                Err(e) => {
                    if candidate.origin.is_explicit() {
                        warn!(
                            "Configured server directory {} is not usable: {}",
                            candidate.path.display(),
                            e
                        );
                    } else {
                        debug!("Rejected {}: {}", candidate.path.display(), e);
                    }
                    rejected.push(Rejection {
                        candidate,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Err(Error::install_not_found(
            rejected.iter().map(|r| r.to_string()).collect(),
        ))
    }
}

/// `<steam>/steamapps/common/VRisingDedicatedServer`
pub fn steam_server_dir(steam_root: &Path) -> PathBuf {
    steam_root
        .join("steamapps")
        .join("common")
        .join(SERVER_DIR_NAME)
}

/// Usual Steam install locations for the current platform.
fn default_steam_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();

    if cfg!(windows) {
        for var in ["ProgramFiles(x86)", "ProgramFiles"] {
            if let Some(dir) = std::env::var_os(var) {
                roots.push(PathBuf::from(dir).join("Steam"));
            }
        }
        roots.push(PathBuf::from(r"C:\Program Files (x86)\Steam"));
    } else if let Some(home) = dirs::home_dir() {
        if cfg!(target_os = "macos") {
            roots.push(home.join("Library/Application Support/Steam"));
        } else {
            roots.push(home.join(".steam/steam"));
            roots.push(home.join(".local/share/Steam"));
        }
    }

    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::MARKER_FILE;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn fake_install(dir: &Path) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(MARKER_FILE), b"MZ").unwrap();
    }

    #[test]
    fn test_flag_wins_when_valid() {
        let temp = TempDir::new().unwrap();
        let server = temp.path().join("server");
        fake_install(&server);

        let located = InstallLocator::new()
            .with_flag(Some(&server))
            .locate()
            .unwrap();

        assert_eq!(located.origin, CandidateOrigin::Flag);
        assert!(located.rejected.is_empty());
    }

    #[test]
    fn test_invalid_flag_falls_back_to_steam() {
        let temp = TempDir::new().unwrap();
        let steam = temp.path().join("Steam");
        fake_install(&steam_server_dir(&steam));

        let located = InstallLocator::new()
            .with_flag(Some(temp.path().join("wrong")))
            .with_steam_roots(vec![steam.clone()])
            .locate()
            .unwrap();

        assert_eq!(located.origin, CandidateOrigin::Steam);
        assert_eq!(located.rejected.len(), 1);
        assert_eq!(located.rejected[0].candidate.origin, CandidateOrigin::Flag);
    }

    #[test]
    fn test_flag_before_config() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fake_install(&a);
        fake_install(&b);

        let located = InstallLocator::new()
            .with_config(Some(&b))
            .with_flag(Some(&a))
            .locate()
            .unwrap();

        // Insertion order decides; the CLI adds the flag first.
        assert_eq!(located.origin, CandidateOrigin::ConfigFile);

        let located = InstallLocator::new()
            .with_flag(Some(&a))
            .with_config(Some(&b))
            .locate()
            .unwrap();
        assert_eq!(located.origin, CandidateOrigin::Flag);
    }

    #[test]
    fn test_nothing_found_lists_every_candidate() {
        let temp = TempDir::new().unwrap();
        let err = InstallLocator::new()
            .with_flag(Some(temp.path().join("x")))
            .with_steam_roots(vec![temp.path().join("Steam")])
            .locate()
            .unwrap_err();

        let msg = err.to_string();
        assert!(matches!(err, Error::InstallNotFound { .. }));
        assert!(msg.contains("--server-dir"));
        assert!(msg.contains("steam library"));
    }

    #[test]
    fn test_candidates_are_deduplicated() {
        let temp = TempDir::new().unwrap();
        let steam = temp.path().join("Steam");
        let server = steam_server_dir(&steam);

        let locator = InstallLocator::new()
            .with_flag(Some(&server))
            .with_steam_roots(vec![steam.clone(), steam]);

        let candidates = locator.candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].origin, CandidateOrigin::Flag);
    }

    #[test]
    #[serial]
    fn test_from_env_reads_variables() {
        let temp = TempDir::new().unwrap();
        let server = temp.path().join("server");
        fake_install(&server);

        std::env::set_var(SERVER_DIR_ENV, &server);
        std::env::set_var(STEAM_DIR_ENV, temp.path().join("Steam"));

        let locator = InstallLocator::from_env();
        let candidates = locator.candidates();

        std::env::remove_var(SERVER_DIR_ENV);
        std::env::remove_var(STEAM_DIR_ENV);

        assert_eq!(candidates[0].origin, CandidateOrigin::Environment);
        assert_eq!(candidates[0].path, server);
        assert_eq!(
            candidates[1].path,
            steam_server_dir(&temp.path().join("Steam"))
        );
        assert_eq!(locator.locate().unwrap().origin, CandidateOrigin::Environment);
    }
}
