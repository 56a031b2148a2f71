//! Whole-table access to the crontab.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use hostctl_exec::CommandRunner;

use crate::backup::BackupPolicy;
use crate::{CronError, Result};

/// Reads and replaces the crontab as one ordered sequence of lines.
///
/// `write` either installs the complete sequence or fails leaving the
/// previous table in place.
pub trait CrontabStore {
    fn read(&self) -> Result<Vec<String>>;
    fn write(&self, lines: &[String]) -> Result<()>;
}

/// Text form of a line sequence, newline-terminated as crontab expects.
pub fn render(lines: &[String]) -> String {
    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text
}

/// Split crontab text into lines on `\n` only. A `\r` before the newline
/// stays part of its line so [`render`] writes it back unchanged.
pub fn split_lines(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = text.split('\n').map(String::from).collect();
    if text.is_empty() || text.ends_with('\n') {
        lines.pop();
    }
    lines
}

/// The invoking (or configured) user's crontab, via the `crontab` binary.
pub struct SystemCrontab<R: CommandRunner> {
    runner: R,
    binary: String,
    user: Option<String>,
    backup: Option<BackupPolicy>,
}

impl<R: CommandRunner> SystemCrontab<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            binary: "crontab".to_string(),
            user: None,
            backup: None,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    pub fn with_backup(mut self, backup: Option<BackupPolicy>) -> Self {
        self.backup = backup;
        self
    }

    fn args<'a>(&'a self, op: &'a str) -> Vec<&'a str> {
        let mut args = Vec::with_capacity(3);
        if let Some(user) = &self.user {
            args.push("-u");
            args.push(user.as_str());
        }
        args.push(op);
        args
    }

    fn snapshot_current(&self, policy: &BackupPolicy) {
        match self.read() {
            Ok(current) if current.is_empty() => {}
            Ok(current) => {
                if let Err(e) = policy.save(&render(&current)) {
                    tracing::warn!(dir = %policy.dir().display(), "Crontab backup failed: {e}");
                }
            }
            Err(e) => tracing::warn!("Could not read crontab for backup: {e}"),
        }
    }
}

impl<R: CommandRunner> CrontabStore for SystemCrontab<R> {
    fn read(&self) -> Result<Vec<String>> {
        let out = self.runner.run(&self.binary, &self.args("-l"), None)?;
        if out.success() {
            return Ok(split_lines(&out.stdout));
        }
        if out.stderr.contains("no crontab for") {
            tracing::debug!("No crontab installed yet");
            return Ok(Vec::new());
        }
        Err(CronError::ReadFailure {
            status: out.status,
            stderr: out.stderr.trim().to_string(),
        })
    }

    fn write(&self, lines: &[String]) -> Result<()> {
        if let Some(policy) = &self.backup {
            self.snapshot_current(policy);
        }

        let text = render(lines);
        let out = self.runner.run(&self.binary, &self.args("-"), Some(&text))?;
        if !out.success() {
            return Err(CronError::PersistFailure {
                status: out.status,
                stderr: out.stderr.trim().to_string(),
            });
        }
        tracing::info!(lines = lines.len(), "Installed crontab");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    lines: RefCell<Vec<String>>,
    writes: Cell<usize>,
    reject_next: Cell<bool>,
}

/// In-memory crontab. Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct MemoryCrontab {
    state: Rc<MemoryState>,
}

impl MemoryCrontab {
    pub fn new(lines: Vec<String>) -> Self {
        let store = Self::default();
        *store.state.lines.borrow_mut() = lines;
        store
    }

    pub fn from_text(text: &str) -> Self {
        Self::new(split_lines(text))
    }

    pub fn lines(&self) -> Vec<String> {
        self.state.lines.borrow().clone()
    }

    pub fn text(&self) -> String {
        render(&self.state.lines.borrow())
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> usize {
        self.state.writes.get()
    }

    /// Make the next `write` fail like a rejected install.
    pub fn reject_next_write(&self) {
        self.state.reject_next.set(true);
    }
}

impl CrontabStore for MemoryCrontab {
    fn read(&self) -> Result<Vec<String>> {
        Ok(self.lines())
    }

    fn write(&self, lines: &[String]) -> Result<()> {
        if self.state.reject_next.replace(false) {
            return Err(CronError::PersistFailure {
                status: 1,
                stderr: "rejected".to_string(),
            });
        }
        *self.state.lines.borrow_mut() = lines.to_vec();
        self.state.writes.set(self.state.writes.get() + 1);
        Ok(())
    }
}
