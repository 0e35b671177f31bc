//! Line-oriented `.config` handling.
//!
//! Only two things are needed from the kernel config: the value of
//! `CONFIG_LOCALVERSION` (to name the built image) and the ability to
//! bump its embedded `-<host>-X.Y.Z` minor component after each source
//! update.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// Read `CONFIG_LOCALVERSION` from a `.config`, without the leading dash.
///
/// `CONFIG_LOCALVERSION="-foo-2.5.0"` yields `foo-2.5.0`.
pub fn read_localversion(config_path: &Path) -> Result<String> {
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("reading kernel config {}", config_path.display()))?;

    for line in content.lines() {
        if let Some(value) = line.strip_prefix("CONFIG_LOCALVERSION=") {
            let value = value.trim().trim_matches('"');
            return Ok(value.strip_prefix('-').unwrap_or(value).to_string());
        }
    }

    bail!(
        "CONFIG_LOCALVERSION not set in {}",
        config_path.display()
    )
}

/// Increment the minor component of the `-<host>-X.Y.Z` localversion.
///
/// Returns the new `X.Y.Z` string. The config is rewritten in place;
/// every other line is preserved verbatim.
pub fn bump_localversion_minor(config_path: &Path) -> Result<String> {
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("reading kernel config {}", config_path.display()))?;

    let mut new_version = None;
    let mut lines: Vec<String> = Vec::with_capacity(content.lines().count());

    for line in content.lines() {
        if line.starts_with("CONFIG_LOCALVERSION=") && new_version.is_none() {
            let (rewritten, version) = bump_line(line)
                .with_context(|| format!("malformed localversion line: {line}"))?;
            lines.push(rewritten);
            new_version = Some(version);
        } else {
            lines.push(line.to_string());
        }
    }

    let Some(version) = new_version else {
        bail!(
            "CONFIG_LOCALVERSION not set in {}",
            config_path.display()
        );
    };

    let mut rewritten = lines.join("\n");
    rewritten.push('\n');
    fs::write(config_path, rewritten)
        .with_context(|| format!("writing kernel config {}", config_path.display()))?;

    Ok(version)
}

/// Rewrite one `CONFIG_LOCALVERSION="-host-X.Y.Z"` line with Y + 1.
fn bump_line(line: &str) -> Result<(String, String)> {
    let value = line
        .strip_prefix("CONFIG_LOCALVERSION=")
        .unwrap_or(line)
        .trim()
        .trim_matches('"');

    // "-host-X.Y.Z" -> host label may itself contain dashes.
    let trimmed = value.strip_prefix('-').unwrap_or(value);
    let Some((host, semver)) = trimmed.rsplit_once('-') else {
        bail!("expected '-<host>-X.Y.Z', got {value:?}");
    };

    let parts: Vec<&str> = semver.split('.').collect();
    let [major, minor, patch] = parts.as_slice() else {
        bail!("expected dotted X.Y.Z version, got {semver:?}");
    };
    let minor: u64 = minor
        .parse()
        .with_context(|| format!("non-numeric minor version in {semver:?}"))?;

    let new_semver = format!("{}.{}.{}", major, minor + 1, patch);
    let rewritten = format!("CONFIG_LOCALVERSION=\"-{host}-{new_semver}\"");
    Ok((rewritten, new_semver))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn read_localversion_strips_quotes_and_dash() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".config");
        fs::write(&path, "CONFIG_FOO=y\nCONFIG_LOCALVERSION=\"-foo-2.5.0\"\n").unwrap();
        assert_eq!(read_localversion(&path).unwrap(), "foo-2.5.0");
    }

    #[test]
    fn read_localversion_missing_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".config");
        fs::write(&path, "CONFIG_FOO=y\n").unwrap();
        assert!(read_localversion(&path).is_err());
    }

    #[test]
    fn bump_increments_minor_only() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".config");
        fs::write(
            &path,
            "CONFIG_FOO=y\nCONFIG_LOCALVERSION=\"-foo-2.5.0\"\nCONFIG_BAR=n\n",
        )
        .unwrap();

        let version = bump_localversion_minor(&path).unwrap();
        assert_eq!(version, "2.6.0");

        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("CONFIG_LOCALVERSION=\"-foo-2.6.0\""));
        assert!(rewritten.contains("CONFIG_FOO=y"));
        assert!(rewritten.contains("CONFIG_BAR=n"));
    }

    #[test]
    fn bump_handles_dashed_hostnames() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".config");
        fs::write(&path, "CONFIG_LOCALVERSION=\"-build-box-1.9.3\"\n").unwrap();

        let version = bump_localversion_minor(&path).unwrap();
        assert_eq!(version, "1.10.3");
        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("CONFIG_LOCALVERSION=\"-build-box-1.10.3\""));
    }

    #[test]
    fn bump_rejects_unversioned_localversion() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".config");
        fs::write(&path, "CONFIG_LOCALVERSION=\"-plain\"\n").unwrap();
        assert!(bump_localversion_minor(&path).is_err());
    }
}
