//! Versioned directory names and latest-version resolution.
//!
//! Kernel source trees live one-per-release as `<label>-X.Y.Z`
//! directories (e.g. `linux-6.10.1`). Ordering is component-wise integer
//! comparison of the dotted tuple, never string comparison, so
//! `linux-6.10.1` beats `linux-6.9.0`.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MaintError, Result};

/// A directory name split into a base label and a numeric version tuple.
///
/// Comparison is only meaningful between equal labels; [`resolve_latest`]
/// guarantees that by filtering on the label first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedName {
    pub label: String,
    pub version: (u64, u64, u64),
}

impl VersionedName {
    /// Parse `<label>-<major>.<minor>.<patch>`.
    ///
    /// Returns `None` for anything that does not match exactly: missing
    /// dash, non-numeric components, or the wrong number of dots. A
    /// malformed name is simply not a candidate, not an error, so mixed
    /// directories (e.g. a stray `linux-backup`) resolve fine.
    pub fn parse(name: &str) -> Option<Self> {
        let (label, suffix) = name.rsplit_once('-')?;
        if label.is_empty() {
            return None;
        }

        let mut parts = suffix.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }

        Some(VersionedName {
            label: label.to_string(),
            version: (major, minor, patch),
        })
    }

    /// The directory name this was parsed from.
    pub fn dir_name(&self) -> String {
        let (major, minor, patch) = self.version;
        format!("{}-{}.{}.{}", self.label, major, minor, patch)
    }

    /// Order two names sharing a label by their numeric tuple.
    pub fn version_cmp(&self, other: &Self) -> Ordering {
        debug_assert_eq!(self.label, other.label);
        self.version.cmp(&other.version)
    }
}

impl std::fmt::Display for VersionedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.dir_name())
    }
}

/// A resolved source tree: its parsed name plus the on-disk path.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub name: VersionedName,
    pub path: PathBuf,
}

/// Find the highest-versioned `<label>-X.Y.Z` directory under `parent`.
///
/// Non-matching entries (files, unrelated subdirectories, malformed
/// suffixes) are skipped. Fails with [`MaintError::NoCandidatesFound`]
/// when nothing matches. True ties cannot occur because directory names
/// are unique within a parent.
pub fn resolve_latest(parent: &Path, label: &str) -> Result<ResolvedSource> {
    let entries = fs::read_dir(parent).map_err(|e| MaintError::from_io(e, parent))?;

    let mut best: Option<ResolvedSource> = None;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().and_then(VersionedName::parse) else {
            continue;
        };
        if name.label != label {
            continue;
        }

        let replace = match &best {
            Some(current) => name.version_cmp(&current.name) == Ordering::Greater,
            None => true,
        };
        if replace {
            best = Some(ResolvedSource {
                name,
                path: entry.path(),
            });
        }
    }

    best.ok_or_else(|| MaintError::NoCandidatesFound {
        label: label.to_string(),
        dir: parent.to_path_buf(),
    })
}

/// List every `<label>-X.Y.Z` directory under `parent`, newest first.
pub fn list_versions(parent: &Path, label: &str) -> Result<Vec<ResolvedSource>> {
    let entries = fs::read_dir(parent).map_err(|e| MaintError::from_io(e, parent))?;

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let file_name = entry.file_name();
        if let Some(name) = file_name.to_str().and_then(VersionedName::parse) {
            if name.label == label {
                found.push(ResolvedSource {
                    name,
                    path: entry.path(),
                });
            }
        }
    }

    found.sort_by(|a, b| b.name.version_cmp(&a.name));
    Ok(found)
}

/// Sort arbitrary directory names newest-first for pruning.
///
/// Prunable names embed one or more dotted `X.Y.Z` triples in several
/// shapes: source trees (`linux-6.10.1`), module directories
/// (`6.10.1-host-2.6.0`), and staged images
/// (`vmlinuz-6.10.1-host-2.6.0.efi`). Each name is keyed by every
/// triple it contains, in order, compared component-wise as integers;
/// the release triple dominates and the localversion triple breaks
/// ties. Names with no triple at all sort after every versioned name,
/// in reverse lexicographic order, so pruning removes unrecognizable
/// leftovers first and never the newest release.
pub fn sort_newest_first(names: &mut [PathBuf]) {
    #[derive(PartialEq, Eq, PartialOrd, Ord)]
    enum Key {
        Versioned(Vec<(u64, u64, u64)>, String),
        Plain(String),
    }

    fn key(path: &Path) -> Key {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let triples: Vec<(u64, u64, u64)> =
            name.split('-').filter_map(leading_triple).collect();
        if triples.is_empty() {
            Key::Plain(name.to_string())
        } else {
            Key::Versioned(triples, name.to_string())
        }
    }

    names.sort_by(|a, b| match (key(a), key(b)) {
        (Key::Versioned(va, na), Key::Versioned(vb, nb)) => {
            vb.cmp(&va).then_with(|| nb.cmp(&na))
        }
        (Key::Versioned(..), Key::Plain(_)) => Ordering::Less,
        (Key::Plain(_), Key::Versioned(..)) => Ordering::Greater,
        (ka, kb) => kb.cmp(&ka),
    });
}

/// The leading `X.Y.Z` integer triple of a dash-separated segment, if
/// any. Trailing non-numeric components (`2.6.0.efi`) are ignored.
fn leading_triple(segment: &str) -> Option<(u64, u64, u64)> {
    let mut nums = segment.split('.').map_while(|p| p.parse::<u64>().ok());
    Some((nums.next()?, nums.next()?, nums.next()?))
}
