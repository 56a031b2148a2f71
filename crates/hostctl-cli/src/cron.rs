//! `hostctl cron ...` subcommands.

use std::io::{BufRead, Write};

use anyhow::{Context, bail};
use clap::Subcommand;

use hostctl_config::HostctlConfig;
use hostctl_cron::backup::BackupPolicy;
use hostctl_cron::{
    CronManager, CrontabStore, EditOutcome, MarkerFormat, MemoryCrontab, SystemCrontab,
    normalize_name,
};
use hostctl_exec::{NoGate, PrivilegeGate, RootGate, SystemRunner};

use crate::render;

#[derive(Subcommand)]
pub enum CronAction {
    /// List managed jobs
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one job
    Show {
        name: String,
        #[arg(long)]
        json: bool,
    },
    /// Add a new job
    Add {
        name: String,
        /// Five cron fields or an @shorthand, e.g. "0 3 * * *"
        #[arg(short, long)]
        schedule: String,
        #[arg(short, long)]
        command: String,
        /// Append output to <log_dir>/<name>.log
        #[arg(long)]
        log: bool,
    },
    /// Change a job's schedule, command and/or name
    Edit {
        name: String,
        #[arg(short, long)]
        schedule: Option<String>,
        #[arg(short, long)]
        command: Option<String>,
        /// New job name
        #[arg(long = "name")]
        new_name: Option<String>,
    },
    /// Rename a job (log file references follow)
    Rename { name: String, new_name: String },
    /// Copy a job under a new name, optionally editing the copy
    Clone {
        source: String,
        new_name: String,
        #[arg(short, long)]
        schedule: Option<String>,
        #[arg(short, long)]
        command: Option<String>,
    },
    /// Enable a disabled job
    Enable { name: String },
    /// Disable a job by commenting out its line
    Disable { name: String },
    /// Flip a job between enabled and disabled
    Toggle { name: String },
    /// Remove a job
    Remove {
        name: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// List crontab backups
    Backups,
}

fn system_store(config: &HostctlConfig) -> anyhow::Result<SystemCrontab<SystemRunner>> {
    let cron = &config.cron;
    let backup = if cron.backup.enabled {
        Some(BackupPolicy::new(config.backup_dir()?, cron.backup.keep))
    } else {
        None
    };
    Ok(SystemCrontab::new(SystemRunner::new())
        .with_binary(cron.crontab_bin.clone())
        .with_user(cron.user.clone())
        .with_backup(backup))
}

pub fn run(config: &HostctlConfig, action: CronAction, dry_run: bool) -> anyhow::Result<()> {
    let format = MarkerFormat::new(config.cron.tool_name.clone());
    let store = system_store(config)?;
    let mut input = std::io::stdin().lock();

    if dry_run {
        if let Some(text) = dry_run_on(&store, config, action, &mut input)? {
            println!("--- resulting crontab (not installed) ---");
            print!("{text}");
        }
        return Ok(());
    }

    let gate: Box<dyn PrivilegeGate> = if config.cron.require_root {
        Box::new(RootGate::new(SystemRunner::new()))
    } else {
        Box::new(NoGate)
    };
    let manager = CronManager::new(Box::new(store), format, gate)
        .with_log_dir(config.cron.log_dir.clone());
    execute(&manager, config, action, &mut input)
}

/// Run `action` against an in-memory copy of `source`. Returns the
/// resulting crontab text when the action changed anything.
fn dry_run_on(
    source: &dyn CrontabStore,
    config: &HostctlConfig,
    action: CronAction,
    input: &mut dyn BufRead,
) -> anyhow::Result<Option<String>> {
    let copy = MemoryCrontab::new(source.read().context("reading crontab")?);
    let manager = CronManager::new(
        Box::new(copy.clone()),
        MarkerFormat::new(config.cron.tool_name.clone()),
        Box::new(NoGate),
    )
    .with_log_dir(config.cron.log_dir.clone());
    execute(&manager, config, action, input)?;
    Ok((copy.write_count() > 0).then(|| copy.text()))
}

fn execute(
    manager: &CronManager,
    config: &HostctlConfig,
    action: CronAction,
    input: &mut dyn BufRead,
) -> anyhow::Result<()> {
    match action {
        CronAction::List { json } => {
            let jobs = manager.list_jobs()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
            } else {
                print!("{}", render::job_table(&jobs));
            }
        }
        CronAction::Show { name, json } => {
            let name = normalize_name(&name);
            let Some(job) = manager.get(&name)? else {
                bail!("Job '{name}' not found");
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&job)?);
            } else {
                print!("{}", render::job_details(&job));
            }
        }
        CronAction::Add {
            name,
            schedule,
            command,
            log,
        } => {
            let job = manager.add_job(&name, &schedule, &command, log)?;
            println!("Job '{}' added.", job.name);
        }
        CronAction::Edit {
            name,
            schedule,
            command,
            new_name,
        } => {
            if schedule.is_none() && command.is_none() && new_name.is_none() {
                bail!("Nothing to edit: pass --schedule, --command or --name");
            }
            let name = normalize_name(&name);
            let outcome = manager.edit_job(
                &name,
                schedule.as_deref(),
                command.as_deref(),
                new_name.as_deref(),
            )?;
            report(&name, "job", outcome);
        }
        CronAction::Rename { name, new_name } => {
            let name = normalize_name(&name);
            report(&name, "name", manager.edit_name(&name, &new_name)?);
        }
        CronAction::Clone {
            source,
            new_name,
            schedule,
            command,
        } => {
            let job = manager.clone_job_with(
                &normalize_name(&source),
                &new_name,
                schedule.as_deref(),
                command.as_deref(),
            )?;
            println!("Job '{}' cloned to '{}'.", source, job.name);
        }
        CronAction::Enable { name } => {
            let name = normalize_name(&name);
            report(&name, "state", manager.set_enabled(&name, true)?);
        }
        CronAction::Disable { name } => {
            let name = normalize_name(&name);
            report(&name, "state", manager.set_enabled(&name, false)?);
        }
        CronAction::Toggle { name } => {
            let name = normalize_name(&name);
            let enabled = manager.toggle(&name)?;
            println!("Job '{name}' is now {}.", render::status_label(enabled));
        }
        CronAction::Remove { name, yes } => {
            let name = normalize_name(&name);
            if !yes && !confirm(&format!("Remove job '{name}'?"), input)? {
                println!("Cancelled.");
                return Ok(());
            }
            manager.remove_job(&name)?;
            println!("Job '{name}' removed.");
        }
        CronAction::Backups => list_backups(config)?,
    }
    Ok(())
}

fn report(name: &str, what: &str, outcome: EditOutcome) {
    match outcome {
        EditOutcome::Updated => println!("Job '{name}': {what} updated."),
        EditOutcome::Unchanged => println!("Job '{name}': {what} unchanged."),
    }
}

/// Ask a yes/no question. Anything but `y`/`yes` declines, as does EOF.
fn confirm(question: &str, input: &mut dyn BufRead) -> anyhow::Result<bool> {
    print!("{question} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn list_backups(config: &HostctlConfig) -> anyhow::Result<()> {
    let policy = BackupPolicy::new(config.backup_dir()?, config.cron.backup.keep);
    let snapshots = policy.list()?;
    if snapshots.is_empty() {
        println!("No backups in {}", policy.dir().display());
    }
    for path in snapshots {
        println!("{}", path.display());
    }
    Ok(())
}

pub fn health(config: &HostctlConfig) {
    let cron = &config.cron;
    println!("hostctl");
    println!("  marker: {}", MarkerFormat::new(cron.tool_name.clone()).marker_for("<job>"));
    println!("  crontab: {}", cron.crontab_bin);
    println!("  user: {}", cron.user.as_deref().unwrap_or("(current)"));
    println!("  log dir: {}", cron.log_dir.display());
    println!("  require root: {}", cron.require_root);

    match system_store(config) {
        Ok(store) => match store.read() {
            Ok(lines) => {
                let format = MarkerFormat::new(cron.tool_name.clone());
                let jobs = hostctl_cron::JobRegistry::build(&lines, &format);
                let unpaired = jobs
                    .entries()
                    .iter()
                    .filter(|e| e.line_index.is_none())
                    .count();
                println!("  crontab lines: {}", lines.len());
                println!("  managed jobs: {}", jobs.len());
                if unpaired > 0 {
                    println!("  unpaired markers: {unpaired} (fix by hand)");
                }
            }
            Err(e) => println!("  crontab: unreadable ({e})"),
        },
        Err(e) => println!("  backups: misconfigured ({e})"),
    }
}
