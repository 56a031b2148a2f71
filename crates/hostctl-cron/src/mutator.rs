//! Rewrites of managed job lines.
//!
//! Each call reads the crontab once, changes lines by index, checks the
//! privilege gate and installs the result. Nothing is written when any
//! step fails.

use hostctl_exec::PrivilegeGate;

use crate::parser::{self, MarkerFormat};
use crate::registry::{JobEntry, JobRegistry};
use crate::store::CrontabStore;
use crate::{CronError, JobRecord, Result, validated_name};

/// Result of an edit that may turn out to be a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Updated,
    Unchanged,
}

pub struct JobMutator<'a> {
    store: &'a dyn CrontabStore,
    format: &'a MarkerFormat,
    gate: &'a dyn PrivilegeGate,
}

impl<'a> JobMutator<'a> {
    pub fn new(
        store: &'a dyn CrontabStore,
        format: &'a MarkerFormat,
        gate: &'a dyn PrivilegeGate,
    ) -> Self {
        Self {
            store,
            format,
            gate,
        }
    }

    fn load(&self) -> Result<(Vec<String>, JobRegistry)> {
        let lines = self.store.read()?;
        let registry = JobRegistry::build(&lines, self.format);
        Ok((lines, registry))
    }

    fn persist(&self, lines: &[String]) -> Result<()> {
        self.gate.check()?;
        self.store.write(lines)
    }

    /// A job line must stay one line and must not look like a marker.
    fn check_job_line(&self, line: &str) -> Result<()> {
        if line.contains(['\n', '\r']) {
            return Err(CronError::InvalidInput(
                "job line must not contain line breaks".into(),
            ));
        }
        if line.trim().is_empty() {
            return Err(CronError::InvalidInput("job line is empty".into()));
        }
        if self.format.is_marker(line) {
            return Err(CronError::InvalidInput(
                "job line must not be a marker comment".into(),
            ));
        }
        Ok(())
    }

    /// Replace the line paired with `name`'s marker.
    pub fn replace_job_line(&self, name: &str, new_line: &str) -> Result<()> {
        self.update_job_line(name, |_| Ok(Some(new_line.to_string())))
            .map(|_| ())
    }

    /// Compute a new job line from the current record and install it.
    ///
    /// `f` returns `None` when nothing needs to change; no write happens.
    pub fn update_job_line<F>(&self, name: &str, f: F) -> Result<EditOutcome>
    where
        F: FnOnce(&JobRecord) -> Result<Option<String>>,
    {
        let (mut lines, registry) = self.load()?;
        let (entry, line_index) = paired(&registry, name)?;

        let Some(new_line) = f(&entry.record)? else {
            return Ok(EditOutcome::Unchanged);
        };
        self.check_job_line(&new_line)?;
        if lines[line_index] == new_line {
            return Ok(EditOutcome::Unchanged);
        }

        lines[line_index] = new_line;
        self.persist(&lines)?;
        tracing::info!(job = name, "Updated job line");
        Ok(EditOutcome::Updated)
    }

    /// Rename a job, carrying `<old>.log` references along in every
    /// non-marker line of the crontab. Returns the normalized new name.
    pub fn rename_job(&self, old_name: &str, new_name: &str) -> Result<String> {
        let new_name = validated_name(new_name)?;
        let (mut lines, registry) = self.load()?;
        let (entry, _) = paired(&registry, old_name)?;
        if registry.exists(&new_name) {
            return Err(CronError::NameCollision(new_name));
        }

        self.rename_in(&mut lines, entry.marker_index, old_name, &new_name);
        self.persist(&lines)?;
        tracing::info!(from = old_name, to = %new_name, "Renamed job");
        Ok(new_name)
    }

    /// Rewrite a job's line and optionally rename it, in a single install.
    ///
    /// `f` works like in [`update_job_line`](Self::update_job_line). A
    /// `new_name` equal to `name` after normalization is not a rename. Every
    /// check runs before the write, so a failure leaves the crontab as it was.
    pub fn edit_job<F>(&self, name: &str, f: F, new_name: Option<&str>) -> Result<EditOutcome>
    where
        F: FnOnce(&JobRecord) -> Result<Option<String>>,
    {
        let new_name = match new_name {
            Some(n) => Some(validated_name(n)?).filter(|n| n.as_str() != name),
            None => None,
        };
        let (mut lines, registry) = self.load()?;
        let (entry, line_index) = paired(&registry, name)?;
        if let Some(n) = new_name.as_ref().filter(|n| registry.exists(n)) {
            return Err(CronError::NameCollision(n.clone()));
        }

        let mut changed = false;
        if let Some(new_line) = f(&entry.record)? {
            self.check_job_line(&new_line)?;
            if lines[line_index] != new_line {
                lines[line_index] = new_line;
                changed = true;
            }
        }
        if let Some(n) = &new_name {
            self.rename_in(&mut lines, entry.marker_index, name, n);
            changed = true;
        }
        if !changed {
            return Ok(EditOutcome::Unchanged);
        }

        self.persist(&lines)?;
        tracing::info!(job = name, renamed = ?new_name, "Edited job");
        Ok(EditOutcome::Updated)
    }

    fn rename_in(&self, lines: &mut [String], marker_index: usize, old_name: &str, new_name: &str) {
        lines[marker_index] = self.format.marker_for(new_name);
        for line in lines.iter_mut() {
            if !self.format.is_marker(line) {
                *line = parser::replace_log_ref(line, old_name, new_name);
            }
        }
    }

    /// Append a new marker + job line at the end of the crontab.
    pub fn append_job(&self, name: &str, line: &str) -> Result<JobRecord> {
        let name = validated_name(name)?;
        self.check_job_line(line)?;
        let (mut lines, registry) = self.load()?;
        if registry.exists(&name) {
            return Err(CronError::NameCollision(name));
        }

        lines.push(self.format.marker_for(&name));
        lines.push(line.to_string());
        self.persist(&lines)?;
        tracing::info!(job = %name, "Added job");

        let parsed = parser::parse_line(line);
        Ok(JobRecord {
            name,
            schedule: parsed.schedule,
            command: parsed.command,
            enabled: !parser::is_disabled(line),
            line: Some(line.to_string()),
        })
    }

    /// Delete a job's marker and its line together.
    pub fn remove_job(&self, name: &str) -> Result<JobRecord> {
        let (mut lines, registry) = self.load()?;
        let (entry, line_index) = paired(&registry, name)?;

        lines.remove(line_index);
        lines.remove(entry.marker_index);
        self.persist(&lines)?;
        tracing::info!(job = name, "Removed job");
        Ok(entry.record.clone())
    }
}

/// Look up a job that has a job line; unpaired markers are never touched.
fn paired<'r>(registry: &'r JobRegistry, name: &str) -> Result<(&'r JobEntry, usize)> {
    let entry = registry
        .entry(name)
        .ok_or_else(|| CronError::NotFound(name.to_string()))?;
    let line_index = entry
        .line_index
        .ok_or_else(|| CronError::UnpairedMarker(name.to_string()))?;
    Ok((entry, line_index))
}
