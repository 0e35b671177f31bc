use std::process::ExitCode;

use clap::{Parser, Subcommand};

use kmaint::build::{self, BuildOptions};
use kmaint::config::Config;
use kmaint::process::HostRunner;
use kmaint::ui::Ui;
use kmaint::workspace::{self, Layout};
use kmaint::{backup, prune, sync};

#[derive(Parser)]
#[command(
    name = "kmaint",
    version,
    about = "Single-host kernel maintenance: source sync, build, signing, backup, pruning"
)]
struct Cli {
    /// Name of the system whose workspace is operated on
    /// (defaults to the current hostname).
    #[arg(long, global = true, value_name = "HOSTNAME")]
    hostname: Option<String>,

    /// Disable colored output (NO_COLOR=1 also works).
    #[arg(long, global = true)]
    nocolor: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy the latest kernel source into the host workspace and
    /// reconfigure it.
    Update,
    /// Compile a workspace kernel; optionally assemble, sign, and
    /// install a bootable image.
    Build {
        /// Number of parallel compilation jobs.
        #[arg(short, long, value_name = "JOBS")]
        jobs: Option<u32>,
        /// Compile inside a tmpfs directory (requires /etc/fstab entry).
        #[arg(short, long)]
        tmpfs: bool,
        /// Build a unified kernel image (requires dracut).
        #[arg(short, long)]
        uki: bool,
        /// Sign the EFI executable for secure boot (requires sbsign).
        #[arg(short, long)]
        sign: bool,
        /// Install the image to the boot partition.
        #[arg(short, long)]
        install: bool,
        /// Also rebuild the proprietary nvidia driver (Gentoo only).
        #[arg(short, long)]
        nvidia: bool,
    },
    /// Copy the active bootx64.efi to the backup location.
    Backup,
    /// Remove stale entries from the workspace linux/, uki/, and
    /// vmlinuz/ directories.
    PruneSources {
        /// How many entries to keep per directory.
        #[arg(long, value_name = "N")]
        keep: Option<usize>,
    },
    /// Remove stale /lib/modules directories.
    PruneModules {
        /// How many module directories to keep.
        #[arg(long, value_name = "N")]
        keep: Option<usize>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let ui = Ui::new(cli.nocolor);

    if !workspace::is_superuser() {
        ui.error("kmaint: must be superuser.");
        return ExitCode::FAILURE;
    }

    match run(cli, &ui) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            ui.error(&format!("Error: {err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, ui: &Ui) -> anyhow::Result<()> {
    let layout = Layout::default();
    let runner = HostRunner;
    let config = Config::load()?;
    let hostname = match cli.hostname {
        Some(name) => name,
        None => workspace::system_hostname()?,
    };

    match cli.command {
        Command::Update => sync::run_update(&layout, &hostname, &runner, ui),
        Command::Build {
            jobs,
            tmpfs,
            uki,
            sign,
            install,
            nvidia,
        } => {
            let opts = BuildOptions {
                jobs: jobs.unwrap_or(config.jobs),
                tmpfs,
                uki,
                sign,
                install,
                nvidia,
            };
            build::run_build(&layout, &hostname, opts, &config, &runner, ui)
        }
        Command::Backup => backup::run_backup(&layout, &runner, ui),
        Command::PruneSources { keep } => {
            prune::run_prune_sources(&layout, &hostname, keep.unwrap_or(config.keep), ui)
        }
        Command::PruneModules { keep } => {
            prune::run_prune_modules(&layout, keep.unwrap_or(config.keep), ui)
        }
    }
}
