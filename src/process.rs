//! Subprocess invocation behind a small capability trait.
//!
//! The maintenance pipelines only need to know how to run an external
//! tool in a working directory, block until exit, and treat non-zero
//! exit as failure. Putting that behind [`Runner`] lets the resolver,
//! sync, and build logic run in tests against a recording fake instead
//! of real `make`, `dracut`, or `sbsign`.

use std::path::Path;
use std::process::Command;

use crate::error::{MaintError, Result};

/// Capability to execute external collaborators.
pub trait Runner {
    /// Run a command with inherited stdio, blocking until exit.
    ///
    /// Inherited stdio matters: `make oldconfig` may prompt and kernel
    /// builds stream progress the user wants to see.
    fn run(&self, command: &str, args: &[&str], cwd: &Path) -> Result<()>;

    /// Like [`Runner::run`] with extra environment variables.
    fn run_with_env(
        &self,
        command: &str,
        args: &[&str],
        cwd: &Path,
        env: &[(&str, &str)],
    ) -> Result<()>;

    /// Run a command and capture its stdout as UTF-8.
    fn run_capture(&self, command: &str, args: &[&str], cwd: &Path) -> Result<String>;
}

/// [`Runner`] backed by `std::process::Command`.
#[derive(Debug, Default)]
pub struct HostRunner;

impl HostRunner {
    fn spawn(
        &self,
        command: &str,
        args: &[&str],
        cwd: &Path,
        env: &[(&str, &str)],
    ) -> Result<()> {
        let mut cmd = Command::new(command);
        cmd.args(args).current_dir(cwd);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let status = cmd.status().map_err(|e| MaintError::SubprocessFailed {
            command: command.to_string(),
            status: e.to_string(),
        })?;

        if !status.success() {
            return Err(MaintError::SubprocessFailed {
                command: render(command, args),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

impl Runner for HostRunner {
    fn run(&self, command: &str, args: &[&str], cwd: &Path) -> Result<()> {
        self.spawn(command, args, cwd, &[])
    }

    fn run_with_env(
        &self,
        command: &str,
        args: &[&str],
        cwd: &Path,
        env: &[(&str, &str)],
    ) -> Result<()> {
        self.spawn(command, args, cwd, env)
    }

    fn run_capture(&self, command: &str, args: &[&str], cwd: &Path) -> Result<String> {
        let output = Command::new(command)
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(|e| MaintError::SubprocessFailed {
                command: command.to_string(),
                status: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(MaintError::SubprocessFailed {
                command: render(command, args),
                status: output.status.to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn render(command: &str, args: &[&str]) -> String {
    let mut line = command.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}
