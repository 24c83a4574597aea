//! Free-space based deletion.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sysinfo::Disks;
use tokio::sync::watch;
use tracing::{info, warn};

use super::sweeper::{prune_empty_dirs, scan};

/// Extensions treated as recordings.
pub const DEFAULT_EXTENSIONS: &[&str] = &["mkv", "mp4", "ts", "avi"];

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Free-space thresholds. A threshold of 0 is disabled.
#[derive(Debug, Clone, PartialEq)]
pub struct SpacePolicy {
    pub min_free_percent: f64,
    pub min_free_bytes: u64,
    /// Upper bound on deletions per pass.
    pub max_delete: usize,
    /// Lowercase extensions without the dot.
    pub extensions: Vec<String>,
    pub dry_run: bool,
}

impl Default for SpacePolicy {
    fn default() -> Self {
        Self {
            min_free_percent: 0.0,
            min_free_bytes: 0,
            max_delete: 500,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            dry_run: false,
        }
    }
}

impl SpacePolicy {
    pub fn is_enabled(&self) -> bool {
        self.min_free_percent > 0.0 || self.min_free_bytes > 0
    }

    pub fn is_satisfied(&self, usage: &DiskUsage) -> bool {
        let percent_ok = self.min_free_percent <= 0.0 || usage.free_percent() >= self.min_free_percent;
        let bytes_ok = self.min_free_bytes == 0 || usage.available_bytes >= self.min_free_bytes;
        percent_ok && bytes_ok
    }

    fn is_recording(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
    }
}

/// Capacity and free space of one filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiskUsage {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl DiskUsage {
    pub fn free_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            self.available_bytes as f64 / self.total_bytes as f64 * 100.0
        }
    }
}

/// Reports usage of the filesystem holding a path.
pub trait DiskProbe: Send {
    fn usage(&mut self, path: &Path) -> Option<DiskUsage>;
}

/// [`DiskProbe`] backed by `sysinfo`.
pub struct SysinfoProbe {
    disks: Disks,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskProbe for SysinfoProbe {
    fn usage(&mut self, path: &Path) -> Option<DiskUsage> {
        self.disks.refresh(true);
        // The disk with the longest matching mount point is the most specific.
        self.disks
            .list()
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().components().count())
            .map(|disk| DiskUsage {
                total_bytes: disk.total_space(),
                available_bytes: disk.available_space(),
            })
    }
}

/// Outcome of one space guard pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpaceReport {
    pub deleted: usize,
    pub bytes_freed: u64,
    /// Files a dry run would have deleted.
    pub planned: usize,
    /// Thresholds held at the end of the pass.
    pub satisfied: bool,
    pub dirs_removed: usize,
}

/// Deletes the oldest recordings until the free-space thresholds hold.
pub struct SpaceGuard {
    root: PathBuf,
    policy: SpacePolicy,
    probe: Box<dyn DiskProbe>,
    active: watch::Receiver<Option<PathBuf>>,
}

impl SpaceGuard {
    pub fn new(
        root: impl Into<PathBuf>,
        policy: SpacePolicy,
        probe: impl DiskProbe + 'static,
        active: watch::Receiver<Option<PathBuf>>,
    ) -> Self {
        Self {
            root: root.into(),
            policy,
            probe: Box::new(probe),
            active,
        }
    }

    pub fn policy(&self) -> &SpacePolicy {
        &self.policy
    }

    pub async fn enforce(&mut self) -> SpaceReport {
        let mut report = SpaceReport::default();
        if !self.policy.is_enabled() {
            report.satisfied = true;
            return report;
        }

        // Mount points are absolute.
        let probe_path = tokio::fs::canonicalize(&self.root)
            .await
            .unwrap_or_else(|_| self.root.clone());
        let Some(usage) = self.probe.usage(&probe_path) else {
            warn!(root = %self.root.display(), "No disk statistics for recording root");
            return report;
        };
        if self.policy.is_satisfied(&usage) {
            report.satisfied = true;
            return report;
        }

        info!(
            root = %self.root.display(),
            free_percent = %format!("{:.1}", usage.free_percent()),
            free_gb = %format!("{:.2}", usage.available_bytes as f64 / BYTES_PER_GIB),
            min_free_percent = self.policy.min_free_percent,
            min_free_gb = %format!("{:.2}", self.policy.min_free_bytes as f64 / BYTES_PER_GIB),
            "Free space below threshold, deleting oldest recordings"
        );

        let scan = scan(&self.root).await;
        let mut candidates: Vec<_> = scan
            .files
            .into_iter()
            .filter(|f| self.policy.is_recording(&f.path))
            .collect();
        candidates.sort_by_key(|f| f.modified);

        for file in candidates {
            if report.deleted + report.planned >= self.policy.max_delete {
                warn!(max_delete = self.policy.max_delete, "Deletion limit reached for this pass");
                break;
            }
            let is_active = self.active.borrow().as_deref() == Some(file.path.as_path());
            if is_active {
                continue;
            }

            if self.policy.dry_run {
                info!(path = %file.path.display(), size = file.size, "Would delete to free space");
                report.planned += 1;
                continue;
            }

            match tokio::fs::remove_file(&file.path).await {
                Ok(()) => {
                    info!(path = %file.path.display(), size = file.size, "Deleted to free space");
                    report.deleted += 1;
                    report.bytes_freed += file.size;
                }
                Err(e) => {
                    warn!(kind = "RetentionError", path = %file.path.display(), error = %e, "Failed to delete recording");
                    continue;
                }
            }

            if let Some(usage) = self.probe.usage(&probe_path)
                && self.policy.is_satisfied(&usage)
            {
                report.satisfied = true;
                break;
            }
        }

        if report.deleted > 0 {
            report.dirs_removed = prune_empty_dirs(scan.dirs, &self.active).await;
        }

        if !report.satisfied && !self.policy.dry_run {
            warn!(
                deleted = report.deleted,
                "Free space still below threshold after cleanup"
            );
        }
        report
    }
}
