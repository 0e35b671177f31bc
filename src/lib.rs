//! Single-host kernel maintenance toolkit.
//!
//! Automates the routine chores of running self-built kernels on one
//! machine: syncing the newest `/usr/src/linux-X.Y.Z` tree into a
//! per-host workspace, compiling and signing an EFI image, installing
//! it to the boot partition, backing up the previous bootable image,
//! and pruning stale source and module directories.
//!
//! # Architecture
//!
//! ```text
//! kmaint (bin)
//!     │  clap flags -> one subcommand per maintenance task
//!     │
//!     ├── sync     - version resolution + workspace synchronization
//!     ├── build    - make / dracut / sbsign pipeline, /boot install
//!     ├── backup   - bootx64.efi -> backup.efi with digest check
//!     └── prune    - keep-newest-N cleanup of sources and modules
//!
//! shared seams:
//!     version   - `<label>-X.Y.Z` parsing, numeric ordering
//!     workspace - fixed filesystem layout, per-host dirs, advisory lock
//!     process   - Runner trait over external tools (fakeable in tests)
//!     ui        - colored status lines and prompts, no global state
//! ```
//!
//! Everything is single-threaded and blocking; each subcommand is a
//! linear pipeline that aborts on the first reported failure.

pub mod backup;
pub mod build;
pub mod config;
pub mod error;
pub mod fsops;
pub mod kconfig;
pub mod preflight;
pub mod process;
pub mod prune;
pub mod sync;
pub mod ui;
pub mod version;
pub mod workspace;

pub use error::{MaintError, Result};
pub use process::{HostRunner, Runner};
pub use version::{resolve_latest, ResolvedSource, VersionedName};
pub use workspace::{HostWorkspace, Layout};
