//! User-facing job operations on top of the registry and mutator.

use std::path::{Path, PathBuf};

use hostctl_exec::PrivilegeGate;

use crate::mutator::JobMutator;
use crate::parser::{self, MarkerFormat, SCHEDULE_FIELDS};
use crate::registry::JobRegistry;
use crate::store::CrontabStore;
use crate::{CronError, JobRecord, Result, validated_name};

pub use crate::mutator::EditOutcome;

/// Manages the tool-owned jobs of one crontab.
pub struct CronManager {
    store: Box<dyn CrontabStore>,
    format: MarkerFormat,
    gate: Box<dyn PrivilegeGate>,
    log_dir: Option<PathBuf>,
}

impl CronManager {
    pub fn new(
        store: Box<dyn CrontabStore>,
        format: MarkerFormat,
        gate: Box<dyn PrivilegeGate>,
    ) -> Self {
        Self {
            store,
            format,
            gate,
            log_dir: None,
        }
    }

    /// Directory used for `<name>.log` redirects added by [`add_job`](Self::add_job).
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn format(&self) -> &MarkerFormat {
        &self.format
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }

    fn mutator(&self) -> JobMutator<'_> {
        JobMutator::new(self.store.as_ref(), &self.format, self.gate.as_ref())
    }

    fn registry(&self) -> Result<JobRegistry> {
        let lines = self.store.read()?;
        Ok(JobRegistry::build(&lines, &self.format))
    }

    // ─── Queries ───────────────────────────────────────────

    /// All managed jobs, in crontab order.
    pub fn list_jobs(&self) -> Result<Vec<JobRecord>> {
        Ok(self.registry()?.jobs())
    }

    pub fn get(&self, name: &str) -> Result<Option<JobRecord>> {
        Ok(self.registry()?.get(name).cloned())
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.registry()?.exists(name))
    }

    /// Raw crontab lines, including foreign content.
    pub fn raw_lines(&self) -> Result<Vec<String>> {
        self.store.read()
    }

    // ─── Create / remove ───────────────────────────────────

    /// Add a new enabled job. With `log`, output is appended to
    /// `<log_dir>/<name>.log`.
    pub fn add_job(
        &self,
        name: &str,
        schedule: &str,
        command: &str,
        log: bool,
    ) -> Result<JobRecord> {
        let name = validated_name(name)?;
        let schedule = clean_schedule(schedule)?;
        let mut command = clean_command(command)?;
        if log {
            let dir = self
                .log_dir
                .as_deref()
                .ok_or_else(|| CronError::InvalidInput("no log directory configured".into()))?;
            command = with_log_redirect(&command, dir, &name);
        }
        self.mutator()
            .append_job(&name, &parser::compose_line(&schedule, &command, true))
    }

    pub fn remove_job(&self, name: &str) -> Result<JobRecord> {
        self.mutator().remove_job(name)
    }

    // ─── Edits ─────────────────────────────────────────────

    /// Change any of a job's schedule, command and name in one install.
    ///
    /// All inputs are checked before the crontab is touched, so a bad value
    /// in one of them leaves the job exactly as it was. The enabled state is
    /// kept, and a rename carries `<name>.log` references along.
    pub fn edit_job(
        &self,
        name: &str,
        schedule: Option<&str>,
        command: Option<&str>,
        new_name: Option<&str>,
    ) -> Result<EditOutcome> {
        let schedule = schedule.map(clean_schedule).transpose()?;
        let command = command.map(clean_command).transpose()?;

        self.mutator().edit_job(
            name,
            |job| {
                let schedule_changed = schedule
                    .as_deref()
                    .is_some_and(|s| job.schedule.as_deref() != Some(s));
                let command_changed = command
                    .as_deref()
                    .is_some_and(|c| job.command.as_deref() != Some(c));
                if !schedule_changed && !command_changed {
                    return Ok(None);
                }
                let new_schedule = schedule
                    .as_deref()
                    .or(job.schedule.as_deref())
                    .ok_or_else(|| {
                        CronError::InvalidInput(format!(
                            "job '{}' has no parseable schedule; set one first",
                            job.name
                        ))
                    })?;
                let new_command = command.as_deref().unwrap_or(job.command_display());
                Ok(Some(parser::compose_line(
                    new_schedule,
                    new_command,
                    job.enabled,
                )))
            },
            new_name,
        )
    }

    /// Change a job's schedule, keeping its command and enabled state.
    pub fn edit_schedule(&self, name: &str, schedule: &str) -> Result<EditOutcome> {
        self.edit_job(name, Some(schedule), None, None)
    }

    /// Change a job's command, keeping its schedule and enabled state.
    pub fn edit_command(&self, name: &str, command: &str) -> Result<EditOutcome> {
        self.edit_job(name, None, Some(command), None)
    }

    /// Rename a job. Log references to `<name>.log` anywhere in the
    /// crontab follow the new name.
    pub fn edit_name(&self, name: &str, new_name: &str) -> Result<EditOutcome> {
        self.edit_job(name, None, None, Some(new_name))
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<EditOutcome> {
        self.mutator().update_job_line(name, |job| {
            if job.enabled == enabled {
                return Ok(None);
            }
            let line = job.line.as_deref().unwrap_or_default();
            Ok(Some(if enabled {
                parser::enable(line)
            } else {
                parser::disable(line)
            }))
        })
    }

    /// Flip a job's enabled state; returns the new state.
    pub fn toggle(&self, name: &str) -> Result<bool> {
        let mut now_enabled = false;
        self.mutator().update_job_line(name, |job| {
            now_enabled = !job.enabled;
            let line = job.line.as_deref().unwrap_or_default();
            Ok(Some(if job.enabled {
                parser::disable(line)
            } else {
                parser::enable(line)
            }))
        })?;
        Ok(now_enabled)
    }

    // ─── Clone ─────────────────────────────────────────────

    /// Copy `source` under `new_name`, appended at the end of the crontab.
    ///
    /// Only the copied line has its `<source>.log` references renamed; the
    /// source job is left as it was.
    pub fn clone_job(&self, source: &str, new_name: &str) -> Result<JobRecord> {
        self.clone_job_with(source, new_name, None, None)
    }

    /// [`clone_job`](Self::clone_job), with the copy's schedule and/or
    /// command replaced before it is appended.
    pub fn clone_job_with(
        &self,
        source: &str,
        new_name: &str,
        schedule: Option<&str>,
        command: Option<&str>,
    ) -> Result<JobRecord> {
        let new_name = validated_name(new_name)?;
        let schedule = schedule.map(clean_schedule).transpose()?;
        let command = command.map(clean_command).transpose()?;
        let registry = self.registry()?;
        let entry = registry
            .entry(source)
            .ok_or_else(|| CronError::NotFound(source.to_string()))?;
        let line = entry
            .record
            .line
            .as_deref()
            .ok_or_else(|| CronError::UnpairedMarker(source.to_string()))?;
        if registry.exists(&new_name) {
            return Err(CronError::NameCollision(new_name));
        }

        let mut new_line = parser::replace_log_ref(line, source, &new_name);
        if schedule.is_some() || command.is_some() {
            let parsed = parser::parse_line(&new_line);
            let new_schedule = schedule.or(parsed.schedule).ok_or_else(|| {
                CronError::InvalidInput(format!(
                    "job '{source}' has no parseable schedule; pass one for the copy"
                ))
            })?;
            let new_command = match command {
                Some(c) => c,
                None => parsed
                    .command
                    .unwrap_or_else(|| parser::strip_disabled(&new_line).to_string()),
            };
            new_line = parser::compose_line(
                &new_schedule,
                &new_command,
                !parser::is_disabled(&new_line),
            );
        }
        self.mutator().append_job(&new_name, &new_line)
    }
}

/// Trimmed single-line schedule with fields separated by single spaces.
///
/// Only the shape is checked (five fields or one `@` shorthand) so that the
/// resulting line splits back into the same schedule and command.
fn clean_schedule(schedule: &str) -> Result<String> {
    if schedule.contains(['\n', '\r']) {
        return Err(CronError::InvalidInput("schedule must be a single line".into()));
    }
    let fields: Vec<&str> = schedule.split_whitespace().collect();
    let shorthand = fields.len() == 1 && fields[0].starts_with('@');
    if fields.len() != SCHEDULE_FIELDS && !shorthand {
        return Err(CronError::InvalidInput(format!(
            "schedule '{}' must have {SCHEDULE_FIELDS} fields or be an @shorthand",
            schedule.trim()
        )));
    }
    if fields.len() == SCHEDULE_FIELDS && fields[0].starts_with('@') {
        return Err(CronError::InvalidInput(format!(
            "schedule '{}' mixes an @shorthand with fields",
            schedule.trim()
        )));
    }
    Ok(fields.join(" "))
}

fn clean_command(command: &str) -> Result<String> {
    if command.contains(['\n', '\r']) {
        return Err(CronError::InvalidInput("command must be a single line".into()));
    }
    let command = command.trim();
    if command.is_empty() {
        return Err(CronError::InvalidInput("command is empty".into()));
    }
    Ok(command.to_string())
}

/// Append `>> <dir>/<name>.log 2>&1` to a command.
pub fn with_log_redirect(command: &str, dir: &Path, name: &str) -> String {
    format!(
        "{command} >> {} 2>&1",
        dir.join(parser::log_file_name(name)).display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCrontab;
    use hostctl_exec::{NoGate, PrivilegeError};

    struct DenyGate;

    impl PrivilegeGate for DenyGate {
        fn check(&self) -> std::result::Result<(), PrivilegeError> {
            Err(PrivilegeError::NotRoot("33".into()))
        }
    }

    fn manager(text: &str) -> (CronManager, MemoryCrontab) {
        let store = MemoryCrontab::from_text(text);
        let mgr = CronManager::new(
            Box::new(store.clone()),
            MarkerFormat::new("hostctl"),
            Box::new(NoGate),
        )
        .with_log_dir("/var/log");
        (mgr, store)
    }

    const BASE: &str = "MAILTO=ops@example.com\n\
        # nightly rotation, do not touch\n\
        0 0 * * * /usr/sbin/logrotate /etc/logrotate.conf\n\
        # hostctl: backup\n\
        0 3 * * * /opt/backup.sh >> /var/log/backup.log 2>&1";

    #[test]
    fn test_add_then_list_roundtrip() {
        let (mgr, _) = manager(BASE);
        mgr.add_job("Sync Assets", "*/10 * * * *", "rsync -a /src /dst", false)
            .unwrap();
        let jobs = mgr.list_jobs().unwrap();
        assert_eq!(jobs.len(), 2);
        let job = &jobs[1];
        assert_eq!(job.name, "sync-assets");
        assert!(job.enabled);
        assert_eq!(job.line.as_deref(), Some("*/10 * * * * rsync -a /src /dst"));
        assert_eq!(job.schedule.as_deref(), Some("*/10 * * * *"));
    }

    #[test]
    fn test_add_with_log() {
        let (mgr, _) = manager("");
        let job = mgr.add_job("report", "@hourly", "/opt/report", true).unwrap();
        assert_eq!(
            job.line.as_deref(),
            Some("@hourly /opt/report >> /var/log/report.log 2>&1")
        );
    }

    #[test]
    fn test_add_rejects_bad_schedule() {
        let (mgr, store) = manager(BASE);
        for bad in ["* * * *", "", "@daily 5", "@daily * * * *"] {
            let err = mgr.add_job("x", bad, "/bin/true", false).unwrap_err();
            assert!(matches!(err, CronError::InvalidInput(_)), "{bad}");
        }
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_edit_schedule_same_is_noop() {
        let (mgr, store) = manager(BASE);
        let before = store.text();
        let outcome = mgr.edit_schedule("backup", "0 3 * * *").unwrap();
        assert_eq!(outcome, EditOutcome::Unchanged);
        assert_eq!(store.text(), before);
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_edit_schedule() {
        let (mgr, store) = manager(BASE);
        let outcome = mgr.edit_schedule("backup", "30 2 * * 1-5").unwrap();
        assert_eq!(outcome, EditOutcome::Updated);
        assert_eq!(
            store.lines()[4],
            "30 2 * * 1-5 /opt/backup.sh >> /var/log/backup.log 2>&1"
        );
        assert_eq!(&store.lines()[..4], &BASE.lines().collect::<Vec<_>>()[..4]);
    }

    #[test]
    fn test_edit_schedule_keeps_disabled() {
        let (mgr, store) = manager("# hostctl: off\n# 0 1 * * * /bin/off");
        mgr.edit_schedule("off", "0 2 * * *").unwrap();
        assert_eq!(store.lines()[1], "# 0 2 * * * /bin/off");
    }

    #[test]
    fn test_edit_schedule_unparsed_line() {
        let (mgr, store) = manager("# hostctl: odd\nrun-me now");
        mgr.edit_schedule("odd", "0 1 * * *").unwrap();
        assert_eq!(store.lines()[1], "0 1 * * * run-me now");
    }

    #[test]
    fn test_edit_command() {
        let (mgr, store) = manager(BASE);
        mgr.edit_command("backup", "/opt/backup.sh --full").unwrap();
        assert_eq!(store.lines()[4], "0 3 * * * /opt/backup.sh --full");
        assert_eq!(
            mgr.edit_command("backup", "  /opt/backup.sh --full ").unwrap(),
            EditOutcome::Unchanged
        );
    }

    #[test]
    fn test_edit_command_unparsed_line() {
        let (mgr, store) = manager("# hostctl: odd\nrun-me now");
        let err = mgr.edit_command("odd", "/bin/true").unwrap_err();
        assert!(matches!(err, CronError::InvalidInput(_)));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_edit_name() {
        let (mgr, store) = manager(BASE);
        assert_eq!(mgr.edit_name("backup", "Backup").unwrap(), EditOutcome::Unchanged);
        assert_eq!(mgr.edit_name("backup", "backup2").unwrap(), EditOutcome::Updated);
        let lines = store.lines();
        assert_eq!(lines[3], "# hostctl: backup2");
        assert_eq!(lines[4], "0 3 * * * /opt/backup.sh >> /var/log/backup2.log 2>&1");
        assert!(matches!(
            mgr.edit_name("backup2", "  "),
            Err(CronError::InvalidName(_))
        ));
    }

    #[test]
    fn test_edit_name_same_name_requires_job() {
        let (mgr, store) = manager("# hostctl: a\n* * * * * a\n# hostctl: orphan");
        assert!(matches!(
            mgr.edit_name("ghost", "ghost"),
            Err(CronError::NotFound(_))
        ));
        assert!(matches!(
            mgr.edit_name("orphan", "orphan"),
            Err(CronError::UnpairedMarker(_))
        ));
        assert_eq!(mgr.edit_name("a", "A").unwrap(), EditOutcome::Unchanged);
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_edit_job_bad_command_leaves_schedule() {
        let (mgr, store) = manager("# hostctl: a\n0 3 * * * /bin/true");
        let err = mgr
            .edit_job("a", Some("0 4 * * *"), Some("   "), None)
            .unwrap_err();
        assert!(matches!(err, CronError::InvalidInput(_)));
        assert_eq!(store.lines()[1], "0 3 * * * /bin/true");
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_edit_job_bad_name_leaves_line() {
        let (mgr, store) = manager("# hostctl: a\n0 3 * * * /bin/true");
        let err = mgr
            .edit_job("a", Some("0 4 * * *"), Some("/bin/false"), Some("a/b"))
            .unwrap_err();
        assert!(matches!(err, CronError::InvalidName(_)));
        assert_eq!(store.text(), "# hostctl: a\n0 3 * * * /bin/true\n");
    }

    #[test]
    fn test_edit_job_all_fields_one_write() {
        let (mgr, store) = manager(BASE);
        let outcome = mgr
            .edit_job(
                "backup",
                Some("15 1 * * *"),
                Some("/opt/backup.sh --full >> /var/log/backup.log"),
                Some("Full Backup"),
            )
            .unwrap();
        assert_eq!(outcome, EditOutcome::Updated);
        assert_eq!(store.write_count(), 1);
        let lines = store.lines();
        assert_eq!(lines[3], "# hostctl: full-backup");
        assert_eq!(
            lines[4],
            "15 1 * * * /opt/backup.sh --full >> /var/log/full-backup.log"
        );
    }

    #[test]
    fn test_crlf_foreign_line_survives_mutation() {
        let (mgr, store) = manager("FOO=bar\r\n# hostctl: a\n* * * * * /bin/true\n");
        assert_eq!(mgr.set_enabled("a", false).unwrap(), EditOutcome::Updated);
        let lines = store.lines();
        assert_eq!(lines[0], "FOO=bar\r");
        assert_eq!(lines[2], "# * * * * * /bin/true");
        assert_eq!(store.text(), "FOO=bar\r\n# hostctl: a\n# * * * * * /bin/true\n");
    }

    #[test]
    fn test_rename_collision_leaves_lines() {
        let (mgr, store) = manager(BASE);
        mgr.add_job("b", "@daily", "/bin/b", false).unwrap();
        let before = store.lines();
        let err = mgr.edit_name("backup", "b").unwrap_err();
        assert!(matches!(err, CronError::NameCollision(_)));
        assert_eq!(store.lines(), before);
    }

    #[test]
    fn test_disable_enable_roundtrip() {
        let (mgr, store) = manager("# hostctl: t\n* * * * * /bin/true");
        assert_eq!(mgr.set_enabled("t", false).unwrap(), EditOutcome::Updated);
        assert_eq!(store.lines()[1], "# * * * * * /bin/true");
        assert!(!mgr.get("t").unwrap().unwrap().enabled);
        assert_eq!(mgr.set_enabled("t", false).unwrap(), EditOutcome::Unchanged);
        assert_eq!(mgr.set_enabled("t", true).unwrap(), EditOutcome::Updated);
        assert_eq!(store.lines()[1], "* * * * * /bin/true");
    }

    #[test]
    fn test_toggle() {
        let (mgr, store) = manager("# hostctl: t\n* * * * * /bin/true");
        assert!(!mgr.toggle("t").unwrap());
        assert_eq!(store.lines()[1], "# * * * * * /bin/true");
        assert!(mgr.toggle("t").unwrap());
        assert_eq!(store.lines()[1], "* * * * * /bin/true");
    }

    #[test]
    fn test_clone_is_additive() {
        let (mgr, store) = manager(BASE);
        let before = store.lines();
        let clone = mgr.clone_job("backup", "backup-copy").unwrap();
        let after = store.lines();
        assert_eq!(after.len(), before.len() + 2);
        assert_eq!(&after[..before.len()], &before[..]);
        assert_eq!(after[before.len()], "# hostctl: backup-copy");
        assert_eq!(
            after[before.len() + 1],
            "0 3 * * * /opt/backup.sh >> /var/log/backup-copy.log 2>&1"
        );
        assert_eq!(clone.name, "backup-copy");
    }

    #[test]
    fn test_clone_vs_rename_log_scope() {
        let text = "# hostctl: backup\n\
            0 3 * * * run >> /var/log/backup.log\n\
            9 * * * * grep ERR /var/log/backup.log";

        let (mgr, store) = manager(text);
        mgr.clone_job("backup", "backup2").unwrap();
        let lines = store.lines();
        assert_eq!(lines[1], "0 3 * * * run >> /var/log/backup.log");
        assert_eq!(lines[2], "9 * * * * grep ERR /var/log/backup.log");
        assert_eq!(lines[4], "0 3 * * * run >> /var/log/backup2.log");

        let (mgr, store) = manager(text);
        mgr.edit_name("backup", "backup2").unwrap();
        let lines = store.lines();
        assert_eq!(lines[1], "0 3 * * * run >> /var/log/backup2.log");
        assert_eq!(lines[2], "9 * * * * grep ERR /var/log/backup2.log");
    }

    #[test]
    fn test_clone_with_edits() {
        let (mgr, store) = manager("# hostctl: off\n# 0 1 * * * /bin/off >> /var/log/off.log");
        let clone = mgr
            .clone_job_with("off", "off2", Some("@weekly"), None)
            .unwrap();
        assert!(!clone.enabled);
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.lines()[3], "# @weekly /bin/off >> /var/log/off2.log");

        let err = mgr
            .clone_job_with("off", "off3", Some("0 2 * * *"), Some(" "))
            .unwrap_err();
        assert!(matches!(err, CronError::InvalidInput(_)));
        assert!(!mgr.exists("off3").unwrap());
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_clone_errors() {
        let (mgr, store) = manager("# hostctl: a\n* * * * * a\n# hostctl: orphan");
        assert!(matches!(mgr.clone_job("zzz", "n"), Err(CronError::NotFound(_))));
        assert!(matches!(mgr.clone_job("a", "A"), Err(CronError::NameCollision(_))));
        assert!(matches!(
            mgr.clone_job("orphan", "n"),
            Err(CronError::UnpairedMarker(_))
        ));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_unpaired_marker_safety() {
        let text = "# hostctl: a\n* * * * * a\n# hostctl: orphan";
        let (mgr, store) = manager(text);
        let orphan = mgr.get("orphan").unwrap().unwrap();
        assert!(orphan.line.is_none());

        assert!(mgr.edit_schedule("orphan", "0 1 * * *").is_err());
        assert!(mgr.edit_command("orphan", "/bin/x").is_err());
        assert!(mgr.edit_name("orphan", "adopted").is_err());
        assert!(mgr.set_enabled("orphan", false).is_err());
        assert!(mgr.toggle("orphan").is_err());
        assert!(mgr.remove_job("orphan").is_err());
        assert_eq!(store.text(), format!("{text}\n"));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_privilege_denied_aborts() {
        let store = MemoryCrontab::from_text(BASE);
        let mgr = CronManager::new(
            Box::new(store.clone()),
            MarkerFormat::new("hostctl"),
            Box::new(DenyGate),
        );
        assert!(matches!(
            mgr.edit_schedule("backup", "1 1 * * *"),
            Err(CronError::PrivilegeDenied(_))
        ));
        assert!(matches!(
            mgr.clone_job("backup", "copy"),
            Err(CronError::PrivilegeDenied(_))
        ));
        assert_eq!(store.write_count(), 0);
        assert_eq!(store.text(), format!("{BASE}\n"));
    }

    #[test]
    fn test_foreign_lines_survive() {
        let (mgr, store) = manager(BASE);
        mgr.add_job("x", "@daily", "/bin/x", true).unwrap();
        mgr.set_enabled("backup", false).unwrap();
        mgr.edit_name("x", "y").unwrap();
        mgr.remove_job("y").unwrap();
        let lines = store.lines();
        assert_eq!(lines[0], "MAILTO=ops@example.com");
        assert_eq!(lines[1], "# nightly rotation, do not touch");
        assert_eq!(lines[2], "0 0 * * * /usr/sbin/logrotate /etc/logrotate.conf");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_remove_job() {
        let (mgr, store) = manager(BASE);
        let removed = mgr.remove_job("backup").unwrap();
        assert_eq!(removed.schedule.as_deref(), Some("0 3 * * *"));
        assert_eq!(store.lines().len(), 3);
        assert!(!mgr.exists("backup").unwrap());
    }
}
