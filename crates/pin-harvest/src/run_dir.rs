//! Per-invocation output directory named by start timestamp.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Sortable, human-readable directory name format.
pub const RUN_DIR_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// The folder that receives every file downloaded by one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirectory {
    path: PathBuf,
}

impl RunDirectory {
    /// Create a fresh directory under `root` named after `started_at`.
    ///
    /// A numeric suffix is appended when a run with the same timestamp
    /// already exists.
    pub fn create(root: &Path, started_at: DateTime<Local>) -> std::io::Result<Self> {
        std::fs::create_dir_all(root)?;

        let stamp = started_at.format(RUN_DIR_FORMAT).to_string();
        let mut candidate = root.join(&stamp);
        let mut attempt = 0u32;
        loop {
            match std::fs::create_dir(&candidate) {
                Ok(()) => {
                    tracing::info!("Created run directory {}", candidate.display());
                    return Ok(Self { path: candidate });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    attempt += 1;
                    candidate = root.join(format!("{stamp}-{attempt}"));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Wrap an existing directory without creating anything.
    pub fn existing(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Label stored in the ledger's origin column.
    pub fn label(&self) -> String {
        self.path.display().to_string()
    }
}

impl fmt::Display for RunDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
