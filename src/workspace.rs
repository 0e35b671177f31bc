//! Host filesystem layout and the per-host workspace.
//!
//! The on-disk contract is fixed: versioned kernel sources under
//! `/usr/src`, one workspace per hostname under `/usr/local/src`, module
//! directories under `/lib/modules`, and the EFI images under `/boot`.
//! Only the hostname varies; tests substitute temporary roots through
//! [`Layout`].

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;

use crate::error::MaintError;

/// Label of upstream kernel source directories (`linux-X.Y.Z`).
pub const KERNEL_LABEL: &str = "linux";

/// Workspace subdirectories that hold versioned, prunable entries.
pub const PRUNABLE_DIRS: &[&str] = &["linux", "uki", "vmlinuz"];

const LOCK_FILE: &str = ".kmaint.lock";

/// The fixed filesystem contract, overridable only in tests.
#[derive(Debug, Clone)]
pub struct Layout {
    /// Versioned kernel source trees (`/usr/src`).
    pub system_src: PathBuf,
    /// Parent of all host workspaces (`/usr/local/src`).
    pub local_src: PathBuf,
    /// Installed module directories (`/lib/modules`).
    pub modules: PathBuf,
    /// Boot mount point (`/boot`).
    pub boot: PathBuf,
    /// Parent of per-host tmpfs build directories (`/var/tmp/linux`).
    pub tmpfs: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Layout {
            system_src: PathBuf::from("/usr/src"),
            local_src: PathBuf::from("/usr/local/src"),
            modules: PathBuf::from("/lib/modules"),
            boot: PathBuf::from("/boot"),
            tmpfs: PathBuf::from("/var/tmp/linux"),
        }
    }
}

impl Layout {
    /// The workspace for `hostname`, e.g. `/usr/local/src/foo`.
    pub fn workspace(&self, hostname: &str) -> HostWorkspace {
        HostWorkspace {
            root: self.local_src.join(hostname),
        }
    }

    /// The `/usr/src/linux` convenience symlink the build toolchain expects.
    pub fn kernel_symlink(&self) -> PathBuf {
        self.system_src.join(KERNEL_LABEL)
    }

    /// Active EFI image (`/boot/efi/boot/bootx64.efi`).
    pub fn boot_efi(&self) -> PathBuf {
        self.boot.join("efi/boot/bootx64.efi")
    }

    /// Backup EFI image (`/boot/efi/boot/backup.efi`).
    pub fn backup_efi(&self) -> PathBuf {
        self.boot.join("efi/boot/backup.efi")
    }
}

/// Per-hostname directory tree holding the synced kernel source copy and
/// build artifacts. Long-lived on-disk state, overwritten in place by
/// each update run; never holds more than one current source tree.
#[derive(Debug, Clone)]
pub struct HostWorkspace {
    root: PathBuf,
}

impl HostWorkspace {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Synced source trees, e.g. `/usr/local/src/foo/linux`.
    pub fn linux_dir(&self) -> PathBuf {
        self.root.join("linux")
    }

    /// Staged unified kernel images.
    pub fn uki_dir(&self) -> PathBuf {
        self.root.join("uki")
    }

    /// Staged plain kernel images.
    pub fn vmlinuz_dir(&self) -> PathBuf {
        self.root.join("vmlinuz")
    }

    /// Generated initramfs archives.
    pub fn initramfs_dir(&self) -> PathBuf {
        self.root.join("initramfs")
    }

    /// Take the advisory workspace lock.
    ///
    /// Concurrent runs against one workspace are unsupported; the lock
    /// turns the common accident into a clean error instead of two
    /// processes interleaving copies and removals. Released on drop.
    pub fn lock(&self) -> Result<WorkspaceLock> {
        let path = self.root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("opening lock file {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            return Err(MaintError::WorkspaceLocked {
                path: self.root.clone(),
            }
            .into());
        }

        Ok(WorkspaceLock { file })
    }
}

/// Held advisory lock on a workspace; unlocks on drop.
#[derive(Debug)]
pub struct WorkspaceLock {
    file: File,
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// The running host's name, used when `--hostname` is not given.
pub fn system_hostname() -> Result<String> {
    // /proc is always mounted on the hosts this tool targets.
    let raw = fs::read_to_string("/proc/sys/kernel/hostname")
        .context("reading /proc/sys/kernel/hostname")?;
    Ok(raw.trim().to_string())
}

/// Whether the current process runs with effective UID 0.
///
/// Every subcommand mutates root-owned paths, so the binaries refuse to
/// start without it.
pub fn is_superuser() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_paths_derive_from_hostname() {
        let layout = Layout::default();
        let ws = layout.workspace("foo");
        assert_eq!(ws.root(), Path::new("/usr/local/src/foo"));
        assert_eq!(ws.linux_dir(), Path::new("/usr/local/src/foo/linux"));
        assert_eq!(ws.uki_dir(), Path::new("/usr/local/src/foo/uki"));
        assert_eq!(ws.vmlinuz_dir(), Path::new("/usr/local/src/foo/vmlinuz"));
    }

    #[test]
    fn boot_paths_are_fixed() {
        let layout = Layout::default();
        assert_eq!(layout.boot_efi(), Path::new("/boot/efi/boot/bootx64.efi"));
        assert_eq!(layout.backup_efi(), Path::new("/boot/efi/boot/backup.efi"));
        assert_eq!(layout.kernel_symlink(), Path::new("/usr/src/linux"));
    }

    #[test]
    fn lock_excludes_second_holder() {
        let temp = tempfile::TempDir::new().unwrap();
        let layout = Layout {
            local_src: temp.path().to_path_buf(),
            ..Layout::default()
        };
        fs::create_dir_all(temp.path().join("host")).unwrap();
        let ws = layout.workspace("host");

        let held = ws.lock().unwrap();
        assert!(ws.lock().is_err());
        drop(held);
        assert!(ws.lock().is_ok());
    }
}
