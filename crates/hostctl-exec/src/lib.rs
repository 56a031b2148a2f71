//! hostctl-exec: Process execution and privilege checks.
//!
//! Every hostctl module that talks to the host goes through a
//! [`CommandRunner`], so tests can swap in a scripted runner instead of
//! spawning real binaries.

pub mod privilege;

use std::io::Write;
use std::process::{Command, Stdio};

use thiserror::Error;

pub use privilege::{NoGate, PrivilegeError, PrivilegeGate, RootGate};

/// Maximum captured output size in bytes before truncation.
const MAX_OUTPUT_BYTES: usize = 1_000_000;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write stdin of {program}: {source}")]
    Stdin {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ExecError>;

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status (-1 when killed by a signal).
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs external programs and reports their status and output.
pub trait CommandRunner {
    /// Run `program` with `args`, optionally feeding `stdin`, and wait for it.
    fn run(&self, program: &str, args: &[&str], stdin: Option<&str>) -> Result<CommandOutput>;
}

/// Runner backed by `std::process::Command`.
#[derive(Debug, Default, Clone)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str], stdin: Option<&str>) -> Result<CommandOutput> {
        tracing::debug!(program, ?args, "Running command");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: program.to_string(),
            source,
        })?;

        if let Some(input) = stdin {
            // Dropping the handle closes the pipe so the child sees EOF.
            if let Some(mut pipe) = child.stdin.take() {
                match pipe.write_all(input.as_bytes()) {
                    Ok(()) => {}
                    // The child exited early; its status and stderr say why.
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                        tracing::debug!(program, "Child closed stdin early");
                    }
                    Err(source) => {
                        return Err(ExecError::Stdin {
                            program: program.to_string(),
                            source,
                        });
                    }
                }
            }
        }

        let output = child.wait_with_output().map_err(|source| ExecError::Wait {
            program: program.to_string(),
            source,
        })?;

        let status = output.status.code().unwrap_or(-1);
        let stdout = truncate_output(String::from_utf8_lossy(&output.stdout).to_string());
        let stderr = truncate_output(String::from_utf8_lossy(&output.stderr).to_string());
        tracing::debug!(program, status, "Command finished");

        Ok(CommandOutput {
            status,
            stdout,
            stderr,
        })
    }
}

fn truncate_output(mut text: String) -> String {
    if text.len() > MAX_OUTPUT_BYTES {
        let mut cut = MAX_OUTPUT_BYTES;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("\n... [output truncated]");
    }
    text
}
