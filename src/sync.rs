//! Version resolution and workspace synchronization.
//!
//! The one genuinely stateful operation in the toolkit: find the newest
//! `/usr/src/linux-X.Y.Z`, clear the per-host copy, re-copy, carry the
//! previous kernel configuration forward, and hand off to
//! `make oldconfig`.

use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::Context;

use crate::error::{MaintError, Result};
use crate::fsops;
use crate::kconfig;
use crate::process::Runner;
use crate::ui::Ui;
use crate::version::{self, ResolvedSource, VersionedName};
use crate::workspace::{HostWorkspace, Layout, KERNEL_LABEL};

/// What a [`sync`] run did.
#[derive(Debug)]
pub struct SyncReport {
    pub name: VersionedName,
    /// The new tree, `<workspace>/linux/<label>-X.Y.Z`.
    pub dest: PathBuf,
    pub files_copied: u64,
    /// Whether a `.config` from the replaced tree was carried over.
    pub carried_config: bool,
}

/// Synchronize a resolved source tree into the workspace.
///
/// Pipeline: capture the old `.config` (if any), remove every prior
/// tree with the same label, copy the source tree in, restore the
/// config, run `make oldconfig`. A removal failure aborts before any
/// copy, leaving the destination untouched. A copy failure partway
/// leaves the destination indeterminate; there is no staging directory
/// and no atomic rename.
///
/// Syncing the same resolved version twice is idempotent.
pub fn sync(
    source: &ResolvedSource,
    workspace: &HostWorkspace,
    runner: &dyn Runner,
    ui: &Ui,
) -> Result<SyncReport> {
    if !source.path.is_dir() {
        return Err(MaintError::PathNotFound {
            path: source.path.clone(),
        });
    }

    let dest_root = workspace.linux_dir();
    fs::create_dir_all(&dest_root).map_err(|e| MaintError::from_io(e, &dest_root))?;

    // Capture the newest prior config before anything is deleted. An
    // absent config just means nothing to carry over, but any other
    // read failure aborts here: removing the stale tree would destroy
    // the only copy of the user's configuration.
    let stale = version::list_versions(&dest_root, &source.name.label)?;
    let mut previous_config = None;
    for tree in &stale {
        let config_path = tree.path.join(".config");
        match fs::read_to_string(&config_path) {
            Ok(config) => {
                previous_config = Some(config);
                break;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(MaintError::from_io(e, &config_path)),
        }
    }

    // Clear every prior tree first; abort before copying if any removal
    // fails so the destination never silently mixes stale and new files.
    for tree in &stale {
        fsops::remove_stale_tree(&tree.path)?;
    }

    let dest = dest_root.join(source.name.dir_name());
    ui.status(&format!(
        "Copying {} to {}...",
        source.name,
        dest_root.display()
    ));
    let files_copied = fsops::copy_dir_recursive(&source.path, &dest)?;

    let carried_config = if let Some(config) = previous_config {
        fs::write(dest.join(".config"), config)
            .map_err(|e| MaintError::from_io(e, &dest))?;
        true
    } else {
        false
    };

    // Reconfigure against the carried (or shipped) config. A pristine
    // tree with no config has nothing for oldconfig to work from.
    if dest.join(".config").is_file() {
        ui.status("Making oldconfig...");
        runner.run("make", &["oldconfig"], &dest)?;
    }

    Ok(SyncReport {
        name: source.name.clone(),
        dest,
        files_copied,
        carried_config,
    })
}

/// The `update` subcommand: resolve, sync, bump the localversion minor.
pub fn run_update(
    layout: &Layout,
    hostname: &str,
    runner: &dyn Runner,
    ui: &Ui,
) -> anyhow::Result<()> {
    let workspace = layout.workspace(hostname);
    if !workspace.exists() {
        anyhow::bail!("{} does not exist", workspace.root().display());
    }
    let _lock = workspace.lock()?;

    let source = version::resolve_latest(&layout.system_src, KERNEL_LABEL)
        .context("resolving latest kernel source")?;

    let report = sync(&source, &workspace, runner, ui)
        .with_context(|| format!("syncing {} into {}", source.name, hostname))?;
    // Recount on disk rather than trusting the copy's tally.
    let present = crate::fsops::count_files(&report.dest);
    ui.success(&format!(
        "Successfully copied {} to {} ({} files).",
        report.name,
        workspace.linux_dir().display(),
        present
    ));

    if report.carried_config {
        let version = kconfig::bump_localversion_minor(&report.dest.join(".config"))
            .context("incrementing localversion")?;
        ui.success(&format!("Incremented kernel localversion to {version}."));
        ui.success(&format!(
            "Updated kernel source to {}-{}-{}.",
            report.name, hostname, version
        ));
    } else {
        ui.warn("No previous .config found; skipped config carry-over.");
        ui.success(&format!("Updated kernel source to {}.", report.name));
    }

    Ok(())
}
