//! Backing up the active EFI boot image.
//!
//! Copies `bootx64.efi` to `backup.efi` on the mounted boot partition
//! and verifies the copy by SHA-256 digest before reporting success.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};

use crate::process::Runner;
use crate::ui::Ui;
use crate::workspace::Layout;

/// The `backup` subcommand.
pub fn run_backup(layout: &Layout, runner: &dyn Runner, ui: &Ui) -> Result<()> {
    if !layout.boot.is_dir() {
        bail!("the directory {} does not exist", layout.boot.display());
    }

    let boot = layout.boot.to_string_lossy().into_owned();
    runner
        .run("mount", &[&boot], &layout.boot)
        .with_context(|| format!("mounting {}", layout.boot.display()))?;

    let result = copy_and_verify(layout, runner, ui);

    // Unmount whether or not the copy succeeded.
    let unmounted = runner
        .run("umount", &[&boot], &layout.boot)
        .with_context(|| format!("unmounting {}", layout.boot.display()));
    result?;
    unmounted?;
    Ok(())
}

fn copy_and_verify(layout: &Layout, runner: &dyn Runner, ui: &Ui) -> Result<()> {
    let active = layout.boot_efi();
    let backup = layout.backup_efi();

    if !active.is_file() {
        bail!("no boot image at {}", active.display());
    }

    let version = kernel_version_of(&active, runner)?;

    fs::copy(&active, &backup).with_context(|| {
        format!(
            "copying {} to {}",
            active.display(),
            backup.display()
        )
    })?;

    let (a, b) = (sha256_of(&active)?, sha256_of(&backup)?);
    if a != b {
        bail!(
            "backup digest mismatch: {} != {} (copy corrupted?)",
            a,
            b
        );
    }

    ui.success(&format!(
        "Successfully copied {version} to {}.",
        backup.display()
    ));
    Ok(())
}

/// Extract the kernel version from `file(1)` output for an EFI image.
///
/// `file` prints e.g. `... Linux kernel x86 boot executable bzImage,
/// version 6.10.1-foo-2.6.0 (...)`; the version is the ninth field.
fn kernel_version_of(image: &Path, runner: &dyn Runner) -> Result<String> {
    let image_str = image.to_string_lossy();
    let cwd = image.parent().unwrap_or(Path::new("/"));
    let output = runner
        .run_capture("file", &[&image_str], cwd)
        .context("identifying boot image")?;

    match output.split_whitespace().nth(8) {
        Some(version) => Ok(version.trim_end_matches(',').to_string()),
        None => bail!("could not determine the kernel version of {}", image.display()),
    }
}

fn sha256_of(path: &Path) -> Result<String> {
    let file =
        File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::FakeRunner;
    use tempfile::TempDir;

    const FILE_OUTPUT: &str = "/boot/efi/boot/bootx64.efi: Linux kernel x86 boot \
                               executable bzImage, version 6.10.1-host-2.6.0, RO-rootFS";

    fn fixture() -> (TempDir, Layout) {
        let temp = TempDir::new().unwrap();
        let layout = Layout {
            boot: temp.path().join("boot"),
            ..Layout::default()
        };
        fs::create_dir_all(layout.boot.join("efi/boot")).unwrap();
        (temp, layout)
    }

    #[test]
    fn backup_copies_and_verifies() {
        let (_temp, layout) = fixture();
        fs::write(layout.boot_efi(), "bootable image bytes").unwrap();
        let runner = FakeRunner::new();
        runner.set_stdout("file", FILE_OUTPUT);

        run_backup(&layout, &runner, &Ui::new(true)).unwrap();

        assert_eq!(
            fs::read_to_string(layout.backup_efi()).unwrap(),
            "bootable image bytes"
        );
        assert_eq!(runner.commands(), ["mount", "file", "umount"]);
    }

    #[test]
    fn backup_without_image_still_unmounts() {
        let (_temp, layout) = fixture();
        let runner = FakeRunner::new();

        let err = run_backup(&layout, &runner, &Ui::new(true)).unwrap_err();
        assert!(err.to_string().contains("no boot image"));
        assert_eq!(runner.commands(), ["mount", "umount"]);
    }

    #[test]
    fn version_comes_from_ninth_field() {
        let runner = FakeRunner::new();
        runner.set_stdout("file", FILE_OUTPUT);
        let version =
            kernel_version_of(Path::new("/boot/efi/boot/bootx64.efi"), &runner).unwrap();
        assert_eq!(version, "6.10.1-host-2.6.0");
    }

    #[test]
    fn garbage_file_output_is_an_error() {
        let runner = FakeRunner::new();
        runner.set_stdout("file", "bootx64.efi: data");
        assert!(kernel_version_of(Path::new("/x"), &runner).is_err());
    }

    #[test]
    fn missing_boot_dir_fails_before_mounting() {
        let (_temp, mut layout) = fixture();
        layout.boot = layout.boot.join("not-there");
        let runner = FakeRunner::new();
        assert!(run_backup(&layout, &runner, &Ui::new(true)).is_err());
        assert!(runner.commands().is_empty());
    }
}
