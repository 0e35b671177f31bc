//! Host tool validation before invoking external collaborators.
//!
//! Checking up front prevents cryptic mid-pipeline failures, e.g. a
//! kernel that compiled for twenty minutes only for `sbsign` to be
//! missing.

use crate::error::{MaintError, Result};

/// Check if a command exists in PATH.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Require a single tool, naming the package that provides it.
pub fn require_tool(tool: &str, package: &str) -> Result<()> {
    if command_exists(tool) {
        return Ok(());
    }
    Err(MaintError::ToolMissing {
        tool: tool.to_string(),
        package: package.to_string(),
    })
}

/// Require several tools at once. Each tuple is (command, package).
pub fn require_tools(tools: &[(&str, &str)]) -> Result<()> {
    for (tool, package) in tools {
        require_tool(tool, package)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_exists_finds_standard_tools() {
        assert!(command_exists("ls"));
        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn require_tool_reports_missing_package() {
        let err = require_tool("definitely_not_a_real_command_12345", "fake-pkg").unwrap_err();
        assert!(matches!(err, MaintError::ToolMissing { .. }));
        assert!(err.to_string().contains("fake-pkg"));
    }

    #[test]
    fn require_tools_accepts_present_set() {
        assert!(require_tools(&[("ls", "coreutils"), ("cat", "coreutils")]).is_ok());
    }
}
