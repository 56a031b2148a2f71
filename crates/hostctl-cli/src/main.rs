mod cron;
mod render;

use std::path::{Path, PathBuf};

use anyhow::bail;
use clap::{Parser, Subcommand};
use hostctl_config::HostctlConfig;

#[derive(Parser)]
#[command(name = "hostctl", about = "Server administration console")]
struct Cli {
    /// Config file (defaults to $HOSTCTL_CONFIG or ~/.hostctl/config.json5)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage scheduled jobs in the crontab
    Cron {
        /// Apply changes to a copy and print the resulting crontab
        #[arg(long)]
        dry_run: bool,

        #[command(subcommand)]
        action: cron::CronAction,
    },
    /// Check configuration and crontab access
    Health,
    /// Write a config file with the default settings
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output stays pipeable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Commands::Init { force } = cli.command {
        let path = match cli.config {
            Some(path) => path,
            None => hostctl_config::config_file_path()?,
        };
        init_config(&path, force)?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => hostctl_config::load_config_from(path)?,
        None => hostctl_config::load_config()?,
    };

    match cli.command {
        Commands::Cron { dry_run, action } => cron::run(&config, action, dry_run)?,
        Commands::Health => cron::health(&config),
        Commands::Init { .. } => {}
    }

    Ok(())
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    hostctl_config::save_config_to(&HostctlConfig::default(), path)?;
    Ok(())
}
