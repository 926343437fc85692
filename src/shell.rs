//! The shell abstraction §1/§6 names as an external collaborator: something
//! that executes a command in a working directory and returns its output.
//! `GitOps` is built on top of this trait rather than shelling out directly,
//! so tests can substitute a fake without a real git binary on PATH.

use anyhow::{bail, Context, Result};
use std::process::Command;
use tracing::{error, info};

pub trait Shell {
    /// Run `program` with `args`, returning captured stdout. Non-zero exit
    /// is always an error; callers that need the exit code for control flow
    /// use a dedicated method instead of interpreting the error string.
    fn run(&self, program: &str, args: &[&str]) -> Result<String>;

    /// Like `run`, but does not execute when `dry` is true — it only logs
    /// what would have run and returns an empty string. Read-only commands
    /// should go through `run`; anything that mutates repository or remote
    /// state goes through `run_rw` so `--dry-run` actually does nothing.
    fn run_rw(&self, dry: bool, program: &str, args: &[&str]) -> Result<String>;
}

pub struct SystemShell;

impl SystemShell {
    pub fn new() -> Self {
        SystemShell
    }

    fn shellish(args: &[&str]) -> String {
        args.iter()
            .map(|a| {
                if a.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
                    format!("{:?}", a)
                } else {
                    a.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for SystemShell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell for SystemShell {
    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        if std::env::var_os("STACKPR_VERBOSE").is_some() {
            info!("{} {}", program, Self::shellish(args));
        }
        let out = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("failed to spawn {program}"))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let stdout = String::from_utf8_lossy(&out.stdout);
            error!(
                "{} {:?} failed\nstdout:\n{}\nstderr:\n{}",
                program, args, stdout, stderr
            );
            bail!("command failed: {} {}", program, Self::shellish(args));
        }
        Ok(String::from_utf8_lossy(&out.stdout).to_string())
    }

    fn run_rw(&self, dry: bool, program: &str, args: &[&str]) -> Result<String> {
        if dry {
            info!("DRY-RUN: {} {}", program, Self::shellish(args));
            return Ok(String::new());
        }
        self.run(program, args)
    }
}

pub fn ensure_tool(shell: &dyn Shell, name: &str) -> Result<()> {
    shell
        .run(name, &["--version"])
        .with_context(|| format!("{name} not found in PATH"))?;
    Ok(())
}
