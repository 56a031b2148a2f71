//! Elevation checks consumed right before a mutating write.

use thiserror::Error;

use crate::{CommandRunner, ExecError};

#[derive(Debug, Error)]
pub enum PrivilegeError {
    #[error("Root privileges required (running as uid {0})")]
    NotRoot(String),
    #[error("Could not determine current uid: {0}")]
    Unknown(String),
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Pass/fail gate for operations that need elevated privileges.
pub trait PrivilegeGate {
    fn check(&self) -> Result<(), PrivilegeError>;
}

/// Gate that always passes.
#[derive(Debug, Default, Clone)]
pub struct NoGate;

impl PrivilegeGate for NoGate {
    fn check(&self) -> Result<(), PrivilegeError> {
        Ok(())
    }
}

/// Requires the effective uid to be 0, as reported by `id -u`.
pub struct RootGate<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> RootGate<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> PrivilegeGate for RootGate<R> {
    fn check(&self) -> Result<(), PrivilegeError> {
        let out = self.runner.run("id", &["-u"], None)?;
        if !out.success() {
            return Err(PrivilegeError::Unknown(out.stderr.trim().to_string()));
        }
        let uid = out.stdout.trim();
        if uid == "0" {
            Ok(())
        } else {
            tracing::debug!(uid, "Privilege check failed");
            Err(PrivilegeError::NotRoot(uid.to_string()))
        }
    }
}
