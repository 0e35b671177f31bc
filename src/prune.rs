//! Pruning stale kernel source, artifact, and module directories.
//!
//! Each prunable directory keeps its newest N entries (default 2: the
//! running kernel and one fallback) and everything older is removed
//! after an interactive confirmation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::error::MaintError;
use crate::fsops;
use crate::ui::Ui;
use crate::version;
use crate::workspace::{Layout, PRUNABLE_DIRS};

/// What would be kept and removed for one directory.
#[derive(Debug)]
pub struct PrunePlan {
    pub dir: PathBuf,
    pub keep: Vec<PathBuf>,
    pub remove: Vec<PathBuf>,
}

/// Plan a prune of `dir`, keeping the newest `keep` entries.
///
/// Returns `None` when the directory already holds `keep` entries or
/// fewer, i.e. there is nothing to do.
pub fn plan_prune(dir: &Path, keep: usize) -> Result<Option<PrunePlan>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| MaintError::from_io(e, dir))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;

    if entries.len() <= keep {
        return Ok(None);
    }

    version::sort_newest_first(&mut entries);
    let remove = entries.split_off(keep);
    Ok(Some(PrunePlan {
        dir: dir.to_path_buf(),
        keep: entries,
        remove,
    }))
}

/// Remove everything a plan marked for removal.
pub fn execute_plan(plan: &PrunePlan, ui: &Ui) -> Result<()> {
    for path in &plan.remove {
        fsops::remove_path(path)
            .with_context(|| format!("removing {}", path.display()))?;
        ui.success(&format!("Removed {}.", path.display()));
    }
    Ok(())
}

/// Show a plan and ask whether to go ahead.
fn confirm_plan(plan: &PrunePlan, ui: &Ui) -> Result<bool> {
    let name = plan
        .dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| plan.dir.display().to_string());

    ui.status(&format!(
        "We will keep the latest {} {} entries:\n",
        plan.keep.len(),
        name
    ));
    for path in &plan.keep {
        ui.status(&path.display().to_string());
    }
    ui.status(&format!("\nWe will remove the following {name} entries:\n"));
    for path in &plan.remove {
        ui.status(&path.display().to_string());
    }
    ui.status("");

    ui.confirm("Would you like to remove these paths?")
}

/// The `prune-sources` subcommand: prune `linux/`, `uki/`, and
/// `vmlinuz/` under the host workspace.
pub fn run_prune_sources(
    layout: &Layout,
    hostname: &str,
    keep: usize,
    ui: &Ui,
) -> Result<()> {
    let workspace = layout.workspace(hostname);
    if !workspace.exists() {
        bail!("{} does not exist", workspace.root().display());
    }
    let _lock = workspace.lock()?;

    let mut planned = Vec::new();
    let mut saw_prunable_dir = false;
    for sub in PRUNABLE_DIRS {
        let dir = workspace.root().join(sub);
        if !dir.is_dir() {
            continue;
        }
        saw_prunable_dir = true;

        match plan_prune(&dir, keep)? {
            Some(plan) => {
                if confirm_plan(&plan, ui)? {
                    planned.push(plan);
                }
            }
            None => ui.success(&format!("The {sub} directory has already been pruned.\n")),
        }
    }

    if !saw_prunable_dir {
        bail!(
            "no prunable directories found under {}; expected {}",
            workspace.root().display(),
            PRUNABLE_DIRS.join(", ")
        );
    }

    if planned.is_empty() {
        ui.success("Exiting...\n");
        return Ok(());
    }

    for plan in &planned {
        execute_plan(plan, ui)?;
    }
    ui.success("Successfully pruned all chosen kernel source directories!");
    Ok(())
}

/// The `prune-modules` subcommand: prune `/lib/modules`.
pub fn run_prune_modules(layout: &Layout, keep: usize, ui: &Ui) -> Result<()> {
    match plan_prune(&layout.modules, keep)? {
        Some(plan) => {
            ui.status(&format!(
                "Here is a list of all the available module directories in {}:\n",
                layout.modules.display()
            ));
            if !confirm_plan(&plan, ui)? {
                ui.success("Exiting...");
                return Ok(());
            }
            execute_plan(&plan, ui)?;
            ui.success("Successfully removed all stale module paths.");
        }
        None => ui.success("The module paths have already been pruned."),
    }
    Ok(())
}
