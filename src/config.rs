//! Optional host configuration from `/etc/kmaint.toml`.
//!
//! Everything has a sensible default; the file only overrides defaults
//! and CLI flags override the file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const CONFIG_PATH: &str = "/etc/kmaint.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Parallel jobs for kernel compilation.
    #[serde(default = "default_jobs")]
    pub jobs: u32,
    /// How many versioned entries pruning keeps per directory.
    #[serde(default = "default_keep")]
    pub keep: usize,
    #[serde(default)]
    pub keys: Keys,
}

/// Secure-boot signing material for `sbsign`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Keys {
    #[serde(default = "default_key")]
    pub key: PathBuf,
    #[serde(default = "default_cert")]
    pub cert: PathBuf,
}

fn default_jobs() -> u32 {
    6
}

fn default_keep() -> usize {
    2
}

fn default_key() -> PathBuf {
    PathBuf::from("/etc/keys/efikeys/db.key")
}

fn default_cert() -> PathBuf {
    PathBuf::from("/etc/keys/efikeys/db.crt")
}

impl Default for Config {
    fn default() -> Self {
        Config {
            jobs: default_jobs(),
            keep: default_keep(),
            keys: Keys::default(),
        }
    }
}

impl Default for Keys {
    fn default() -> Self {
        Keys {
            key: default_key(),
            cert: default_cert(),
        }
    }
}

impl Config {
    /// Load `path`, falling back to defaults when the file is absent.
    /// A present-but-invalid file is a hard error, not a silent default.
    pub fn load_from(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn load() -> Result<Config> {
        Self::load_from(Path::new(CONFIG_PATH))
    }
}
