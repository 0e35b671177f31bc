//! Error kinds for kernel maintenance operations.
//!
//! Expected failure conditions get their own variant so callers can match
//! on them; everything else flows through the I/O passthrough. Command
//! orchestration wraps these in `anyhow` with context at the top level.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaintError {
    /// No directory under the scanned parent matched `<label>-X.Y.Z`.
    #[error("no versioned '{label}' directories found in {}", dir.display())]
    NoCandidatesFound { label: String, dir: PathBuf },

    /// An expected source or destination path is missing.
    #[error("path not found: {}", path.display())]
    PathNotFound { path: PathBuf },

    /// A filesystem operation was blocked.
    #[error("permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    /// The destination could not be cleared before syncing. The sync
    /// aborts before copying anything, so the destination is untouched.
    #[error("cannot remove stale tree {}: {source}", path.display())]
    StaleTreeRemovalFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An external tool exited non-zero.
    #[error("{command} failed with {status}")]
    SubprocessFailed { command: String, status: String },

    /// A required external tool is not installed.
    #[error("{tool} was not found in PATH (install: {package})")]
    ToolMissing { tool: String, package: String },

    /// Another instance already holds the workspace lock.
    #[error("workspace {} is locked by another kmaint instance", path.display())]
    WorkspaceLocked { path: PathBuf },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl MaintError {
    /// Map an I/O error for `path` into the typed variant when one fits.
    pub fn from_io(err: io::Error, path: &std::path::Path) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => MaintError::PathNotFound {
                path: path.to_path_buf(),
            },
            io::ErrorKind::PermissionDenied => MaintError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => MaintError::Io(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, MaintError>;
