//! Timestamped crontab snapshots taken before each install.

use std::path::{Path, PathBuf};

use chrono::Utc;

const PREFIX: &str = "crontab-";
const SUFFIX: &str = ".bak";

/// Where snapshots go and how many to retain.
#[derive(Debug, Clone)]
pub struct BackupPolicy {
    dir: PathBuf,
    keep: usize,
}

impl BackupPolicy {
    /// `keep` is clamped to at least one snapshot.
    pub fn new(dir: impl Into<PathBuf>, keep: usize) -> Self {
        Self {
            dir: dir.into(),
            keep: keep.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `content` to a new snapshot and prune old ones.
    pub fn save(&self, content: &str) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;

        // The counter keeps names unique and sortable within one timestamp.
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ");
        let mut n = 0;
        let mut path = self.dir.join(format!("{PREFIX}{stamp}-{n:03}{SUFFIX}"));
        while path.exists() {
            n += 1;
            path = self.dir.join(format!("{PREFIX}{stamp}-{n:03}{SUFFIX}"));
        }

        std::fs::write(&path, content)?;
        tracing::debug!(path = %path.display(), "Saved crontab backup");
        self.prune()?;
        Ok(path)
    }

    /// Snapshots, oldest first.
    pub fn list(&self) -> std::io::Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .flatten()
            .map(|e| e.path())
            .filter(|p| is_snapshot(p))
            .collect();
        files.sort();
        Ok(files)
    }

    fn prune(&self) -> std::io::Result<()> {
        let files = self.list()?;
        if files.len() > self.keep {
            for old in &files[..files.len() - self.keep] {
                std::fs::remove_file(old)?;
            }
        }
        Ok(())
    }
}

fn is_snapshot(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(PREFIX) && n.ends_with(SUFFIX))
}
