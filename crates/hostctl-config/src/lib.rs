use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "HOSTCTL_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Config directory not found")]
    NoDirFound,
}

/// Crontab snapshot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Save the current crontab before every install.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Backup directory (defaults to ~/.hostctl/backups).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Number of snapshots to keep.
    #[serde(default = "default_keep")]
    pub keep: usize,
}

fn default_true() -> bool {
    true
}

fn default_keep() -> usize {
    10
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            keep: default_keep(),
        }
    }
}

/// Managed crontab configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronConfig {
    /// Tool identifier written into marker lines (`# <tool_name>: <job>`).
    #[serde(default = "default_tool_name")]
    pub tool_name: String,
    /// Path or name of the crontab binary.
    #[serde(default = "default_crontab_bin")]
    pub crontab_bin: String,
    /// Target user (`crontab -u`); the invoking user when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Directory holding per-job `<name>.log` files.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Refuse to write unless running as root.
    #[serde(default = "default_true")]
    pub require_root: bool,
    #[serde(default)]
    pub backup: BackupConfig,
}

fn default_tool_name() -> String {
    "hostctl".to_string()
}

fn default_crontab_bin() -> String {
    "crontab".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/hostctl")
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            tool_name: default_tool_name(),
            crontab_bin: default_crontab_bin(),
            user: None,
            log_dir: default_log_dir(),
            require_root: true,
            backup: BackupConfig::default(),
        }
    }
}

/// Top-level hostctl configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostctlConfig {
    #[serde(default)]
    pub cron: CronConfig,
}

impl HostctlConfig {
    /// Backup directory, falling back to `~/.hostctl/backups`.
    pub fn backup_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.cron.backup.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(config_dir()?.join("backups")),
        }
    }
}

/// Resolve the hostctl config directory (~/.hostctl/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".hostctl"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path: `$HOSTCTL_CONFIG`, else ~/.hostctl/config.json5.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from the default path, falling back to defaults.
pub fn load_config() -> Result<HostctlConfig, ConfigError> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let path = config_file_path()?;
    load_config_from(&path)
}

/// Load configuration from a specific path, falling back to defaults if not found.
pub fn load_config_from(path: &Path) -> Result<HostctlConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(HostctlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: HostctlConfig = json5::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a specific path, creating parent directories.
pub fn save_config_to(config: &HostctlConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| ConfigError::Io(std::io::Error::other(e)))?;
    std::fs::write(path, content)?;
    Ok(())
}
