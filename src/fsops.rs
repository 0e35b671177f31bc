//! Filesystem operations shared by the subcommands.
//!
//! Copies preserve symlinks instead of following them; removals map I/O
//! failures into typed errors so callers can abort cleanly.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{MaintError, Result};

/// Recursively copy a directory, preserving symlinks.
///
/// Unlike `fs::copy`, this handles nested directories, symbolic links
/// (preserved, not followed), and regular-file permissions. Returns the
/// number of regular files copied. A failure partway leaves the
/// destination indeterminate; callers that need a pristine destination
/// must clear it first.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<u64> {
    if !dst.exists() {
        fs::create_dir_all(dst).map_err(|e| MaintError::from_io(e, dst))?;
    }

    let mut copied = 0;
    for entry in fs::read_dir(src).map_err(|e| MaintError::from_io(e, src))? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            let target = fs::read_link(&src_path)?;
            if dst_path.exists() || dst_path.is_symlink() {
                fs::remove_file(&dst_path)?;
            }
            std::os::unix::fs::symlink(&target, &dst_path)
                .map_err(|e| MaintError::from_io(e, &dst_path))?;
        } else if file_type.is_dir() {
            copied += copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path).map_err(|e| MaintError::from_io(e, &src_path))?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Remove a stale directory tree before a sync overwrites it.
///
/// Any failure (tree in use, permission denied) becomes
/// [`MaintError::StaleTreeRemovalFailed`] so the caller can abort before
/// copying anything over a half-cleared destination.
pub fn remove_stale_tree(path: &Path) -> Result<()> {
    fs::remove_dir_all(path).map_err(|e| MaintError::StaleTreeRemovalFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Remove a directory tree or single file, whichever `path` is.
pub fn remove_path(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path).map_err(|e| MaintError::from_io(e, path))?;
    if meta.is_dir() {
        fs::remove_dir_all(path).map_err(|e| MaintError::from_io(e, path))
    } else {
        fs::remove_file(path).map_err(|e| MaintError::from_io(e, path))
    }
}

/// Count regular files under `root`, tolerating unreadable entries.
pub fn count_files(root: &Path) -> u64 {
    let mut count = 0;
    for entry in WalkDir::new(root) {
        if let Ok(e) = entry {
            if e.file_type().is_file() {
                count += 1;
            }
        }
    }
    count
}

/// Re-point a symlink at `target`, replacing any existing link.
pub fn replace_symlink(link: &Path, target: &Path) -> Result<()> {
    if link.is_symlink() {
        fs::remove_file(link).map_err(|e| MaintError::from_io(e, link))?;
    }
    std::os::unix::fs::symlink(target, link).map_err(|e| MaintError::from_io(e, link))
}
