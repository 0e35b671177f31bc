//! Kernel compilation, UKI assembly, signing, and boot installation.
//!
//! A linear pipeline over external collaborators (`make`, `dracut`,
//! `sbsign`, `mount`): compile the selected workspace tree, install
//! modules, optionally wrap the image into a signed UKI, and optionally
//! copy it onto the EFI boot partition. Every subprocess goes through
//! the [`Runner`] seam.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::error::MaintError;
use crate::fsops;
use crate::kconfig;
use crate::preflight;
use crate::process::Runner;
use crate::ui::Ui;
use crate::version::{self, ResolvedSource};
use crate::workspace::{Layout, KERNEL_LABEL};

/// Flags of the `build` subcommand.
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    pub jobs: u32,
    pub tmpfs: bool,
    pub uki: bool,
    pub sign: bool,
    pub install: bool,
    pub nvidia: bool,
}

/// The `build` subcommand: pick a workspace kernel and run the pipeline.
pub fn run_build(
    layout: &Layout,
    hostname: &str,
    opts: BuildOptions,
    cfg: &Config,
    runner: &dyn Runner,
    ui: &Ui,
) -> Result<()> {
    let workspace = layout.workspace(hostname);
    if !workspace.exists() {
        bail!("{} does not exist", workspace.root().display());
    }
    let _lock = workspace.lock()?;

    if opts.nvidia && !is_gentoo(Path::new("/etc/os-release"))? {
        bail!("compiling nvidia drivers is only supported on Gentoo");
    }

    let kernels = version::list_versions(&workspace.linux_dir(), KERNEL_LABEL)?;
    if kernels.is_empty() {
        bail!(
            "no kernels were found in {}",
            workspace.linux_dir().display()
        );
    }

    ui.status(&format!(
        "Here is a list of available kernels for {hostname}:\n"
    ));
    let names: Vec<String> = kernels.iter().map(|k| k.name.dir_name()).collect();
    let chosen = &kernels[ui.select("Please select a kernel version:", &names)?];

    let image = build_kernel(layout, hostname, chosen, opts, cfg, runner, ui)?;

    if opts.install {
        install_image(layout, hostname, &image, runner, ui)?;
    }
    Ok(())
}

/// Compile `chosen` and stage the resulting EFI image.
///
/// Returns the staged image path, `<workspace>/{uki,vmlinuz}/vmlinuz-<kver>.efi`.
pub fn build_kernel(
    layout: &Layout,
    hostname: &str,
    chosen: &ResolvedSource,
    opts: BuildOptions,
    cfg: &Config,
    runner: &dyn Runner,
    ui: &Ui,
) -> Result<PathBuf> {
    if opts.uki {
        preflight::require_tool("dracut", "dracut")?;
    }
    if opts.sign {
        preflight::require_tool("sbsign", "sbsigntools")?;
        for path in [&cfg.keys.key, &cfg.keys.cert] {
            if !path.is_file() {
                return Err(MaintError::PathNotFound { path: path.clone() }.into());
            }
        }
    }

    let workspace = layout.workspace(hostname);
    let localversion = kconfig::read_localversion(&chosen.path.join(".config"))
        .with_context(|| format!("no usable .config in {}", chosen.name))?;
    let (major, minor, patch) = chosen.name.version;
    let kver = format!("{major}.{minor}.{patch}-{localversion}");

    // Optionally compile inside a host-specific tmpfs mount.
    let tmpfs_dir = layout.tmpfs.join(hostname);
    let work_dir = if opts.tmpfs {
        fs::create_dir_all(&tmpfs_dir)
            .with_context(|| format!("creating {}", tmpfs_dir.display()))?;
        let tmpfs_str = tmpfs_dir.to_string_lossy();
        runner
            .run("mount", &[&tmpfs_str], &layout.tmpfs)
            .context("mounting tmpfs work directory (is it in /etc/fstab?)")?;
        let work = tmpfs_dir.join(chosen.name.dir_name());
        ui.status(&format!("Copying {} to {}...", chosen.name, work.display()));
        fsops::copy_dir_recursive(&chosen.path, &work)?;
        work
    } else {
        chosen.path.clone()
    };

    // The kernel build system and out-of-tree modules expect
    // /usr/src/linux to point at the tree being compiled.
    fsops::replace_symlink(&layout.kernel_symlink(), &work_dir)?;

    let jobs_arg = format!("-j{}", opts.jobs);
    ui.status(&format!("Compiling kernel {kver}...\n"));
    runner.run("make", &[&jobs_arg], &work_dir)?;

    ui.status(&format!("Installing kernel modules for {kver}...\n"));
    runner.run("make", &["modules_install"], &work_dir)?;

    let output_dir = if opts.uki {
        let initramfs_dir = workspace.initramfs_dir();
        fs::create_dir_all(&initramfs_dir)
            .with_context(|| format!("creating {}", initramfs_dir.display()))?;
        let initramfs = initramfs_dir.join(format!("initramfs-{hostname}.cpio"));
        let kver_arg = format!("--kver={kver}");
        let initramfs_str = initramfs.to_string_lossy();

        ui.status(&format!("Building initramfs for {kver}...\n"));
        runner.run("dracut", &["-f", &kver_arg, &initramfs_str], &work_dir)?;

        // Recompile so the image embeds the fresh initramfs.
        ui.status(&format!(
            "Compiling kernel {kver} with the newly built initramfs...\n"
        ));
        runner.run("make", &[&jobs_arg], &work_dir)?;

        workspace.uki_dir()
    } else {
        workspace.vmlinuz_dir()
    };

    fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;
    let image = output_dir.join(format!("vmlinuz-{kver}.efi"));
    let bzimage = work_dir.join("arch/x86/boot/bzImage");
    if !bzimage.is_file() {
        bail!("kernel build produced no image at {}", bzimage.display());
    }

    if opts.sign {
        sign_image(&bzimage, &image, cfg, runner, ui)?;
        ui.success(&format!("Signed kernel {kver}."));
    } else {
        fs::copy(&bzimage, &image)
            .with_context(|| format!("copying image to {}", image.display()))?;
        ui.success(&format!(
            "Copied vmlinuz-{kver}.efi to local source directory."
        ));
    }

    if opts.nvidia {
        ui.status(&format!("Compiling nvidia drivers for {kver}...\n"));
        runner.run_with_env(
            "emerge",
            &["x11-drivers/nvidia-drivers"],
            &work_dir,
            &[("EMERGE_DEFAULT_OPTS", "--verbose")],
        )?;
    }

    // Leave /usr/src/linux on the durable workspace tree, then drop the
    // tmpfs copy.
    fsops::replace_symlink(&layout.kernel_symlink(), &chosen.path)?;
    ui.success(&format!("Created {} symlink to {kver}.", layout.kernel_symlink().display()));

    if opts.tmpfs {
        fsops::remove_path(&work_dir).context("removing tmpfs work directory")?;
        let tmpfs_str = tmpfs_dir.to_string_lossy();
        runner
            .run("umount", &[&tmpfs_str], &layout.tmpfs)
            .context("unmounting tmpfs work directory")?;
        ui.success(&format!("Unmounted tmpfs directory {}.", tmpfs_dir.display()));
    }

    Ok(image)
}

/// Sign `bzimage` into `output` with the configured secure-boot keys.
fn sign_image(
    bzimage: &Path,
    output: &Path,
    cfg: &Config,
    runner: &dyn Runner,
    ui: &Ui,
) -> Result<()> {
    ui.status(&format!("Signing {}...", output.display()));
    let key = cfg.keys.key.to_string_lossy();
    let cert = cfg.keys.cert.to_string_lossy();
    let out = output.to_string_lossy();
    let image = bzimage.to_string_lossy();
    let cwd = bzimage.parent().unwrap_or(Path::new("/"));

    runner
        .run(
            "sbsign",
            &["--key", &key, "--cert", &cert, "--output", &out, &image],
            cwd,
        )
        .context("signing EFI image")?;
    Ok(())
}

/// Copy a staged image onto the mounted boot partition as `bootx64.efi`.
pub fn install_image(
    layout: &Layout,
    hostname: &str,
    image: &Path,
    runner: &dyn Runner,
    ui: &Ui,
) -> Result<()> {
    fs::create_dir_all(&layout.boot)
        .with_context(|| format!("creating {}", layout.boot.display()))?;

    let boot = layout.boot.to_string_lossy().into_owned();
    runner
        .run("mount", &[&boot], &layout.boot)
        .with_context(|| format!("mounting {}", layout.boot.display()))?;
    ui.success(&format!("Mounted {}.", layout.boot.display()));

    let result = (|| -> Result<()> {
        let target = layout.boot_efi();
        fs::create_dir_all(target.parent().expect("boot_efi has a parent"))
            .context("creating EFI boot directory")?;
        fs::copy(image, &target)
            .with_context(|| format!("copying {} to {}", image.display(), target.display()))?;
        ui.success(&format!("Copied {} to boot!", image.display()));
        Ok(())
    })();

    // Unmount even when the copy failed.
    let unmounted = runner.run("umount", &[&boot], &layout.boot);
    result?;
    unmounted.with_context(|| format!("unmounting {}", layout.boot.display()))?;
    ui.success(&format!("Unmounted {}.", layout.boot.display()));
    ui.success(&format!("Installed kernel for {hostname}."));
    Ok(())
}

/// Whether the host os-release names Gentoo.
fn is_gentoo(os_release: &Path) -> Result<bool> {
    let content = fs::read_to_string(os_release)
        .with_context(|| format!("reading {}", os_release.display()))?;
    for line in content.lines() {
        if let Some(value) = line.strip_prefix("NAME=") {
            return Ok(value.trim().trim_matches('"') == "Gentoo");
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::FakeRunner;
    use crate::version::VersionedName;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, Layout) {
        let temp = TempDir::new().unwrap();
        let layout = Layout {
            system_src: temp.path().join("usr/src"),
            local_src: temp.path().join("usr/local/src"),
            modules: temp.path().join("lib/modules"),
            boot: temp.path().join("boot"),
            tmpfs: temp.path().join("var/tmp/linux"),
        };
        fs::create_dir_all(&layout.system_src).unwrap();
        fs::create_dir_all(layout.local_src.join("host")).unwrap();
        (temp, layout)
    }

    fn seed_kernel(layout: &Layout, name: &str) -> ResolvedSource {
        let path = layout
            .workspace("host")
            .linux_dir()
            .join(name);
        fs::create_dir_all(path.join("arch/x86/boot")).unwrap();
        fs::write(path.join("Makefile"), "all:").unwrap();
        fs::write(path.join("arch/x86/boot/bzImage"), "ELF").unwrap();
        fs::write(
            path.join(".config"),
            "CONFIG_LOCALVERSION=\"-host-2.5.0\"\n",
        )
        .unwrap();
        ResolvedSource {
            name: VersionedName::parse(name).unwrap(),
            path,
        }
    }

    fn opts() -> BuildOptions {
        BuildOptions {
            jobs: 4,
            tmpfs: false,
            uki: false,
            sign: false,
            install: false,
            nvidia: false,
        }
    }

    #[test]
    fn plain_build_compiles_and_stages_vmlinuz() {
        let (_temp, layout) = fixture();
        let chosen = seed_kernel(&layout, "linux-6.10.1");
        let runner = FakeRunner::new();
        let ui = Ui::new(true);

        let image =
            build_kernel(&layout, "host", &chosen, opts(), &Config::default(), &runner, &ui)
                .unwrap();

        assert_eq!(
            image,
            layout
                .workspace("host")
                .vmlinuz_dir()
                .join("vmlinuz-6.10.1-host-2.5.0.efi")
        );
        assert!(image.is_file());
        assert_eq!(runner.commands(), ["make", "make"]);
        let calls = runner.calls.borrow();
        assert_eq!(calls[0].args, ["-j4"]);
        assert_eq!(calls[1].args, ["modules_install"]);
        assert_eq!(
            fs::read_link(layout.kernel_symlink()).unwrap(),
            chosen.path
        );
    }

    #[test]
    fn uki_build_runs_dracut_between_makes() {
        let (_temp, layout) = fixture();
        let chosen = seed_kernel(&layout, "linux-6.10.1");
        let runner = FakeRunner::new();
        let ui = Ui::new(true);
        let o = BuildOptions { uki: true, ..opts() };

        // dracut may be missing on the test host; skip if so.
        if !preflight::command_exists("dracut") {
            eprintln!("skipping: dracut not installed");
            return;
        }

        let image = build_kernel(
            &layout,
            "host",
            &chosen,
            o,
            &Config::default(),
            &runner,
            &ui,
        )
        .unwrap();

        assert!(image.starts_with(layout.workspace("host").uki_dir()));
        assert_eq!(runner.commands(), ["make", "make", "dracut", "make"]);
        let calls = runner.calls.borrow();
        assert!(calls[2].args.contains(&"--kver=6.10.1-host-2.5.0".to_string()));
    }

    #[test]
    fn tmpfs_build_mounts_copies_and_cleans_up() {
        let (_temp, layout) = fixture();
        let chosen = seed_kernel(&layout, "linux-6.10.1");
        let runner = FakeRunner::new();
        let ui = Ui::new(true);
        let o = BuildOptions { tmpfs: true, ..opts() };

        build_kernel(
            &layout,
            "host",
            &chosen,
            o,
            &Config::default(),
            &runner,
            &ui,
        )
        .unwrap();

        assert_eq!(runner.commands(), ["mount", "make", "make", "umount"]);
        // The tmpfs copy is gone; the workspace tree survives.
        assert!(!layout
            .tmpfs
            .join("host/linux-6.10.1")
            .exists());
        assert!(chosen.path.join("Makefile").exists());
        // /usr/src/linux ends up back on the durable tree.
        assert_eq!(
            fs::read_link(layout.kernel_symlink()).unwrap(),
            chosen.path
        );
    }

    #[test]
    fn subprocess_failure_aborts_pipeline() {
        let (_temp, layout) = fixture();
        let chosen = seed_kernel(&layout, "linux-6.10.1");
        let runner = FakeRunner::new();
        runner.fail_on("make");

        let err = build_kernel(
            &layout,
            "host",
            &chosen,
            opts(),
            &Config::default(),
            &runner,
            &Ui::new(true),
        )
        .unwrap_err();
        assert!(err
            .chain()
            .any(|c| matches!(c.downcast_ref(), Some(MaintError::SubprocessFailed { .. }))));
        assert!(!layout.workspace("host").vmlinuz_dir().exists());
    }

    #[test]
    fn signing_requires_key_material() {
        let (_temp, layout) = fixture();
        let chosen = seed_kernel(&layout, "linux-6.10.1");
        let o = BuildOptions { sign: true, ..opts() };

        if !preflight::command_exists("sbsign") {
            // The tool check fires before the key check on hosts
            // without sbsigntools installed.
            let err = build_kernel(
                &layout,
                "host",
                &chosen,
                o,
                &Config::default(),
                &FakeRunner::new(),
                &Ui::new(true),
            )
            .unwrap_err();
            assert!(err
                .chain()
                .any(|c| matches!(c.downcast_ref(), Some(MaintError::ToolMissing { .. }))));
            return;
        }

        let err = build_kernel(
            &layout,
            "host",
            &chosen,
            o,
            &Config::default(),
            &FakeRunner::new(),
            &Ui::new(true),
        )
        .unwrap_err();
        assert!(err
            .chain()
            .any(|c| matches!(c.downcast_ref(), Some(MaintError::PathNotFound { .. }))));
    }

    #[test]
    fn install_image_mounts_copies_unmounts() {
        let (_temp, layout) = fixture();
        let runner = FakeRunner::new();
        let ui = Ui::new(true);
        let staged = layout.local_src.join("staged.efi");
        fs::create_dir_all(&layout.local_src).unwrap();
        fs::write(&staged, "EFI image").unwrap();

        install_image(&layout, "host", &staged, &runner, &ui).unwrap();

        assert_eq!(runner.commands(), ["mount", "umount"]);
        assert_eq!(
            fs::read_to_string(layout.boot_efi()).unwrap(),
            "EFI image"
        );
    }

    #[test]
    fn is_gentoo_parses_os_release() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("os-release");
        fs::write(&path, "NAME=Gentoo\nID=gentoo\n").unwrap();
        assert!(is_gentoo(&path).unwrap());
        fs::write(&path, "NAME=\"Ubuntu\"\nID=ubuntu\n").unwrap();
        assert!(!is_gentoo(&path).unwrap());
    }
}
