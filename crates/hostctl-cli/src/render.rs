//! Plain-text rendering of job records.

use hostctl_cron::JobRecord;

pub fn status_label(enabled: bool) -> &'static str {
    if enabled { "enabled" } else { "disabled" }
}

fn job_status(job: &JobRecord) -> &'static str {
    if job.is_paired() {
        status_label(job.enabled)
    } else {
        "broken"
    }
}

/// Aligned table of jobs, one per line.
pub fn job_table(jobs: &[JobRecord]) -> String {
    if jobs.is_empty() {
        return "No managed jobs.\n".to_string();
    }

    let name_w = jobs.iter().map(|j| j.name.len()).max().unwrap_or(0).max(4);
    let sched_w = jobs
        .iter()
        .map(|j| j.schedule_display().len())
        .max()
        .unwrap_or(0)
        .max(8);

    let mut out = format!(
        "{:<name_w$}  {:<8}  {:<sched_w$}  COMMAND\n",
        "NAME", "STATUS", "SCHEDULE"
    );
    for job in jobs {
        out.push_str(&format!(
            "{:<name_w$}  {:<8}  {:<sched_w$}  {}\n",
            job.name,
            job_status(job),
            job.schedule_display(),
            job.command_display()
        ));
    }
    out
}

pub fn job_details(job: &JobRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("name:     {}\n", job.name));
    out.push_str(&format!("status:   {}\n", job_status(job)));
    out.push_str(&format!("schedule: {}\n", job.schedule_display()));
    out.push_str(&format!("command:  {}\n", job.command_display()));
    match &job.line {
        Some(line) => out.push_str(&format!("line:     {line}\n")),
        None => out.push_str("line:     (missing, marker has no job line)\n"),
    }
    out
}
