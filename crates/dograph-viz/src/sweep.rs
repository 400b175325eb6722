//! Time-based cleanup of rendered artifacts.
//!
//! Invoked once per chat turn rather than from a timer. Several turns (or
//! several processes) may sweep the same directory at once, so a file that
//! vanishes between listing and deletion is expected and only logged.

use serde::Serialize;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::render::is_artifact_file_name;

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub removed: usize,
    pub retained: usize,
    pub failed: usize,
}

pub fn sweep(output_dir: &Path, max_age: Duration) -> SweepReport {
    sweep_at(output_dir, max_age, SystemTime::now())
}

/// Remove artifacts whose modification time is more than `max_age` before `now`.
pub fn sweep_at(output_dir: &Path, max_age: Duration, now: SystemTime) -> SweepReport {
    let mut report = SweepReport::default();

    let entries = match fs::read_dir(output_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
        Err(e) => {
            tracing::warn!(dir = %output_dir.display(), error = %e, "failed to list artifact directory");
            return report;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(dir = %output_dir.display(), error = %e, "failed to read directory entry");
                report.failed += 1;
                continue;
            }
        };
        let name = entry.file_name();
        if !name.to_str().is_some_and(is_artifact_file_name) {
            continue;
        }
        let path = entry.path();

        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to stat artifact");
                report.failed += 1;
                continue;
            }
        };
        // Files stamped in the future count as fresh.
        let age = now.duration_since(modified).unwrap_or_default();
        if age <= max_age {
            report.retained += 1;
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), age_secs = age.as_secs(), "removed expired artifact");
                report.removed += 1;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to delete artifact");
                report.failed += 1;
            }
        }
    }

    report
}
