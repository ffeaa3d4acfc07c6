// SPDX-License-Identifier: GPL-3.0-only

//! Structured external command execution
//!
//! Commands are built as a program plus an argument list, never as a shell
//! string, so device names with spaces or quotes reach the tool verbatim.
//! Every invocation is reduced to success/failure by exit code; stdout is
//! only consulted where a caller explicitly parses it.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, warn};

use crate::{Result, SysError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Feed `input` to the command's standard input.
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn render(&self) -> String {
        render(&self.program, &self.args)
    }
}

pub fn render(command: &str, args: &[String]) -> String {
    if args.is_empty() {
        command.to_string()
    } else {
        format!("{} {}", command, args.join(" "))
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutcome {
    pub command: String,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Host access used by every provisioning routine.
///
/// `run` only fails when the program could not be started; a non-zero exit
/// is reported through [`CommandOutcome::success`].
pub trait CommandRunner {
    fn run(&self, command: &CommandSpec) -> Result<CommandOutcome>;

    /// Whether a device node or file currently exists.
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    /// Sleep between polls of asynchronous kernel state.
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    /// Run and reduce the result to a boolean.
    fn succeeds(&self, command: &CommandSpec) -> bool {
        match self.run(command) {
            Ok(outcome) => {
                if !outcome.success {
                    debug!("{} exited unsuccessfully: {}", outcome.command, outcome.stderr.trim());
                }
                outcome.success
            }
            Err(e) => {
                warn!("{} could not be started: {}", command.render(), e);
                false
            }
        }
    }

    /// Run and fail with [`SysError::CommandFailed`] on a non-zero exit.
    fn check(&self, command: &CommandSpec) -> Result<CommandOutcome> {
        let outcome = self.run(command)?;
        if !outcome.success {
            return Err(SysError::CommandFailed {
                command: outcome.command,
                stderr: outcome.stderr,
            });
        }
        Ok(outcome)
    }

    /// Stdout of a successful run.
    fn output(&self, command: &CommandSpec) -> Result<String> {
        self.check(command).map(|outcome| outcome.stdout)
    }
}

/// Whether `program` can be found on `PATH`.
pub fn tool_available(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Runs commands on the local host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &CommandSpec) -> Result<CommandOutcome> {
        let rendered = command.render();
        debug!("Running: {}", rendered);

        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if command.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = process.spawn().map_err(|error| SysError::CommandFailed {
            command: rendered.clone(),
            stderr: error.to_string(),
        })?;

        if let (Some(input), Some(mut pipe)) = (command.stdin.as_ref(), child.stdin.take()) {
            pipe.write_all(input.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        Ok(CommandOutcome {
            command: rendered,
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
