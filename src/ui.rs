//! Status lines and interactive prompts.
//!
//! Color choice is an explicit value threaded through each command, not
//! a process-wide flag. `--nocolor` and `NO_COLOR=1` both disable
//! styling.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use console::Style;

/// Console reporter for a single command invocation.
#[derive(Debug, Clone)]
pub struct Ui {
    green: Style,
    red: Style,
    yellow: Style,
}

impl Ui {
    /// `no_color` usually comes straight from the `--nocolor` flag; the
    /// `NO_COLOR` environment variable wins regardless.
    pub fn new(no_color: bool) -> Self {
        let enabled = !no_color && std::env::var_os("NO_COLOR").map(|v| v != "1").unwrap_or(true);
        if enabled {
            Ui {
                green: Style::new().green(),
                red: Style::new().red(),
                yellow: Style::new().yellow(),
            }
        } else {
            Ui {
                green: Style::new(),
                red: Style::new(),
                yellow: Style::new(),
            }
        }
    }

    /// Plain progress line ("Copying linux-6.10.1...").
    pub fn status(&self, msg: &str) {
        println!("{msg}");
    }

    /// Green completion line.
    pub fn success(&self, msg: &str) {
        println!("{}", self.green.apply_to(msg));
    }

    pub fn warn(&self, msg: &str) {
        eprintln!("{}", self.yellow.apply_to(msg));
    }

    /// Red failure line on stderr; the caller decides the exit code.
    pub fn error(&self, msg: &str) {
        eprintln!("{}", self.red.apply_to(msg));
    }

    /// Ask a yes/no question; empty input means yes.
    pub fn confirm(&self, question: &str) -> Result<bool> {
        let stdin = io::stdin();
        loop {
            print!("{question} (Y/n) ");
            io::stdout().flush().context("flushing prompt")?;

            let mut line = String::new();
            let read = stdin
                .lock()
                .read_line(&mut line)
                .context("reading confirmation")?;
            // EOF is a refusal, not consent.
            if read == 0 {
                return Ok(false);
            }
            match line.trim().to_lowercase().as_str() {
                "" | "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                other => {
                    self.error(&format!("Invalid input: \"{other}\""));
                    self.error("Please try again.");
                }
            }
        }
    }

    /// Present numbered `items` and read a 1-based selection.
    pub fn select(&self, prompt: &str, items: &[String]) -> Result<usize> {
        for (i, item) in items.iter().enumerate() {
            self.status(&format!("{}. {}", i + 1, item));
        }

        let stdin = io::stdin();
        loop {
            print!("\n{prompt} ");
            io::stdout().flush().context("flushing prompt")?;

            let mut line = String::new();
            let read = stdin.lock().read_line(&mut line).context("reading selection")?;
            if read == 0 {
                anyhow::bail!("stdin closed before a selection was made");
            }
            match line.trim().parse::<usize>() {
                Ok(n) if (1..=items.len()).contains(&n) => return Ok(n - 1),
                _ => {
                    self.error(&format!("Invalid selection: \"{}\"", line.trim()));
                    self.error("Please try again.");
                }
            }
        }
    }
}
