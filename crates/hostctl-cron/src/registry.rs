//! Managed jobs derived from one pass over the crontab lines.

use std::collections::HashMap;

use crate::JobRecord;
use crate::parser::{self, MarkerFormat};

/// A managed job located in a specific line sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEntry {
    pub record: JobRecord,
    /// Index of the marker line.
    pub marker_index: usize,
    /// Index of the paired job line; `None` for an unpaired marker.
    pub line_index: Option<usize>,
}

/// Jobs found in a crontab, in order of first appearance.
///
/// Indices refer to the slice the registry was built from and go stale as
/// soon as that sequence changes; rebuild after every mutation.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    entries: Vec<JobEntry>,
    by_name: HashMap<String, usize>,
}

impl JobRegistry {
    /// Scan `lines` for marker/job-line pairs.
    ///
    /// A marker that is the last line, or is directly followed by another
    /// marker, is recorded as unpaired.
    pub fn build(lines: &[String], format: &MarkerFormat) -> Self {
        let mut registry = Self::default();

        for (idx, line) in lines.iter().enumerate() {
            let Some(name) = format.parse_marker(line) else {
                continue;
            };

            if registry.by_name.contains_key(name) {
                tracing::warn!(job = name, line = idx + 1, "Duplicate job marker ignored");
                continue;
            }

            let next = lines
                .get(idx + 1)
                .filter(|next| !format.is_marker(next));

            let record = match next {
                Some(job_line) => {
                    let parsed = parser::parse_line(job_line);
                    JobRecord {
                        name: name.to_string(),
                        schedule: parsed.schedule,
                        command: parsed.command,
                        enabled: !parser::is_disabled(job_line),
                        line: Some(job_line.clone()),
                    }
                }
                None => {
                    tracing::debug!(job = name, "Marker has no job line");
                    JobRecord {
                        name: name.to_string(),
                        schedule: None,
                        command: None,
                        enabled: false,
                        line: None,
                    }
                }
            };

            registry
                .by_name
                .insert(name.to_string(), registry.entries.len());
            registry.entries.push(JobEntry {
                record,
                marker_index: idx,
                line_index: next.map(|_| idx + 1),
            });
        }

        tracing::debug!(jobs = registry.entries.len(), "Parsed crontab");
        registry
    }

    pub fn entries(&self) -> &[JobEntry] {
        &self.entries
    }

    /// Job records in crontab order.
    pub fn jobs(&self) -> Vec<JobRecord> {
        self.entries.iter().map(|e| e.record.clone()).collect()
    }

    pub fn entry(&self, name: &str) -> Option<&JobEntry> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    pub fn get(&self, name: &str) -> Option<&JobRecord> {
        self.entry(name).map(|e| &e.record)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
