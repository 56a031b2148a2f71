//! hostctl-cron: Tool-managed jobs inside the user's crontab.
//!
//! A managed job is two consecutive crontab lines: a marker comment naming
//! the job, followed by its schedule/command line. Everything else in the
//! crontab belongs to someone else and is passed through untouched.
//!
//! ```text
//! # hostctl: backup
//! 0 3 * * * /usr/local/bin/backup.sh >> /var/log/hostctl/backup.log 2>&1
//! # hostctl: cleanup
//! # 30 4 * * 0 /usr/local/bin/cleanup.sh
//! ```
//!
//! The second job is disabled: its line is commented out with `# `.
//!
//! Every operation re-reads the whole crontab, transforms it in memory and
//! installs the result in one step. There is no locking against other
//! writers; the last install wins.

pub mod backup;
pub mod lifecycle;
pub mod mutator;
pub mod parser;
pub mod registry;
pub mod store;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use lifecycle::{CronManager, EditOutcome};
pub use parser::MarkerFormat;
pub use registry::{JobEntry, JobRegistry};
pub use store::{CrontabStore, MemoryCrontab, SystemCrontab};

/// Placeholder shown when a job line does not decompose into schedule + command.
pub const UNKNOWN_SCHEDULE: &str = "Unknown";

static VALID_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9._-]*$").expect("valid regex"));

#[derive(Debug, Error)]
pub enum CronError {
    #[error("Job '{0}' not found")]
    NotFound(String),
    #[error("Job '{0}' not found (marker has no schedule line)")]
    UnpairedMarker(String),
    #[error("A job named '{0}' already exists")]
    NameCollision(String),
    #[error("Invalid job name '{0}'")]
    InvalidName(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Permission denied: {0}")]
    PrivilegeDenied(String),
    #[error("Could not read crontab (exit {status}): {stderr}")]
    ReadFailure { status: i32, stderr: String },
    #[error("crontab rejected the new table (exit {status}): {stderr}")]
    PersistFailure { status: i32, stderr: String },
    #[error(transparent)]
    Exec(#[from] hostctl_exec::ExecError),
}

impl From<hostctl_exec::PrivilegeError> for CronError {
    fn from(e: hostctl_exec::PrivilegeError) -> Self {
        CronError::PrivilegeDenied(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CronError>;

/// A managed job as derived from the current crontab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job name from the marker line.
    pub name: String,
    /// Schedule fields, if the line could be decomposed.
    pub schedule: Option<String>,
    /// Command text, if the line could be decomposed.
    pub command: Option<String>,
    /// False when the job line is commented out.
    pub enabled: bool,
    /// Verbatim job line; `None` for a marker with no following line.
    pub line: Option<String>,
}

impl JobRecord {
    /// Schedule for display, `Unknown` when it could not be parsed.
    pub fn schedule_display(&self) -> &str {
        self.schedule.as_deref().unwrap_or(UNKNOWN_SCHEDULE)
    }

    /// Command for display; the whole line (minus the disabled prefix)
    /// when it could not be parsed.
    pub fn command_display(&self) -> &str {
        match (&self.command, &self.line) {
            (Some(cmd), _) => cmd,
            (None, Some(line)) => parser::strip_disabled(line),
            (None, None) => "",
        }
    }

    /// Whether the job has a line that can be rewritten.
    pub fn is_paired(&self) -> bool {
        self.line.is_some()
    }
}

/// Normalize a user-supplied job name: trimmed, lowercase, spaces as hyphens.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-")
}

/// Whether `name` is already a valid, normalized job name.
pub(crate) fn is_valid_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

/// Normalize and validate a job name.
pub fn validated_name(name: &str) -> Result<String> {
    let normalized = normalize_name(name);
    if is_valid_name(&normalized) {
        Ok(normalized)
    } else {
        Err(CronError::InvalidName(name.to_string()))
    }
}
