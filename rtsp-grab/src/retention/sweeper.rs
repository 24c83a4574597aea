//! Age-based deletion.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::RetentionError;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Where recordings live and how long they are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub root: PathBuf,
    /// Maximum age in days; 0 keeps everything.
    pub max_age_days: u32,
}

impl RetentionPolicy {
    pub fn new(root: impl Into<PathBuf>, max_age_days: u32) -> Self {
        Self {
            root: root.into(),
            max_age_days,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_age_days > 0
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(u64::from(self.max_age_days) * SECS_PER_DAY)
    }
}

/// Counters of one sweep. `failed` is a subset of `skipped`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes_freed: u64,
    pub dirs_removed: usize,
}

/// A regular file found under the root.
#[derive(Debug, Clone)]
pub(super) struct FileEntry {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

/// Result of walking the tree.
#[derive(Debug, Default)]
pub(super) struct Scan {
    pub files: Vec<FileEntry>,
    /// Subdirectories of the root, root excluded.
    pub dirs: Vec<PathBuf>,
    /// Entries that could not be inspected.
    pub errors: Vec<RetentionError>,
}

/// Walk `root` recursively. Symlinks are not followed; a missing root yields
/// an empty scan.
pub(super) async fn scan(root: &Path) -> Scan {
    let mut out = Scan::default();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if dir == root && e.kind() == std::io::ErrorKind::NotFound => {
                debug!(root = %root.display(), "Recording root does not exist yet");
                continue;
            }
            Err(source) => {
                out.errors.push(RetentionError::ReadDir { path: dir, source });
                continue;
            }
        };
        if dir != root {
            out.dirs.push(dir.clone());
        }

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    out.errors.push(RetentionError::ReadDir {
                        path: dir.clone(),
                        source,
                    });
                    break;
                }
            };
            let path = entry.path();
            let metadata = match tokio::fs::symlink_metadata(&path).await {
                Ok(m) => m,
                Err(source) => {
                    out.errors.push(RetentionError::Metadata { path, source });
                    continue;
                }
            };

            if metadata.is_dir() {
                stack.push(path);
            } else if metadata.is_file() {
                match metadata.modified() {
                    Ok(modified) => out.files.push(FileEntry {
                        path,
                        size: metadata.len(),
                        modified,
                    }),
                    Err(source) => out.errors.push(RetentionError::Metadata { path, source }),
                }
            }
        }
    }

    out
}

/// Deletes recordings older than the policy's maximum age.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    policy: RetentionPolicy,
    active: watch::Receiver<Option<PathBuf>>,
    dry_run: bool,
}

impl RetentionSweeper {
    pub fn new(policy: RetentionPolicy, active: watch::Receiver<Option<PathBuf>>) -> Self {
        Self {
            policy,
            active,
            dry_run: false,
        }
    }

    /// Only report what would be deleted.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(SystemTime::now()).await
    }

    /// Sweep as if the current time were `now`.
    pub async fn sweep_at(&self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();
        if !self.policy.is_enabled() {
            debug!("Age-based retention disabled");
            return report;
        }
        let Some(cutoff) = now.checked_sub(self.policy.max_age()) else {
            return report;
        };

        let root = &self.policy.root;
        let scan = scan(root).await;
        for error in &scan.errors {
            warn!(kind = "RetentionError", error = %error, "Skipping entry");
            report.skipped += 1;
            report.failed += 1;
        }

        for file in &scan.files {
            // Read per file: the writer may roll over while we sweep.
            let is_active = self.active.borrow().as_deref() == Some(file.path.as_path());
            if is_active || file.modified >= cutoff {
                report.skipped += 1;
                continue;
            }

            if self.dry_run {
                info!(path = %file.path.display(), size = file.size, "Would delete expired recording");
                report.deleted += 1;
                report.bytes_freed += file.size;
                continue;
            }

            match tokio::fs::remove_file(&file.path).await {
                Ok(()) => {
                    debug!(path = %file.path.display(), "Deleted expired recording");
                    report.deleted += 1;
                    report.bytes_freed += file.size;
                }
                Err(source) => {
                    let error = RetentionError::Remove {
                        path: file.path.clone(),
                        source,
                    };
                    warn!(kind = "RetentionError", error = %error, "Failed to delete expired recording");
                    report.skipped += 1;
                    report.failed += 1;
                }
            }
        }

        if !self.dry_run {
            report.dirs_removed = prune_empty_dirs(scan.dirs, &self.active).await;
        }

        info!(
            root = %root.display(),
            max_age_days = self.policy.max_age_days,
            deleted = report.deleted,
            skipped = report.skipped,
            failed = report.failed,
            bytes_freed = report.bytes_freed,
            dirs_removed = report.dirs_removed,
            dry_run = self.dry_run,
            "Retention sweep finished"
        );
        report
    }
}

/// Remove empty directories, deepest first. Ancestors of the active
/// segment are kept.
pub(super) async fn prune_empty_dirs(
    mut dirs: Vec<PathBuf>,
    active: &watch::Receiver<Option<PathBuf>>,
) -> usize {
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    let mut removed = 0;

    for dir in dirs {
        let holds_active = active
            .borrow()
            .as_deref()
            .is_some_and(|active| active.starts_with(&dir));
        if holds_active || !is_empty_dir(&dir).await {
            continue;
        }
        match tokio::fs::remove_dir(&dir).await {
            Ok(()) => {
                debug!(dir = %dir.display(), "Removed empty directory");
                removed += 1;
            }
            Err(e) => debug!(dir = %dir.display(), error = %e, "Could not remove directory"),
        }
    }
    removed
}

async fn is_empty_dir(dir: &Path) -> bool {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::ActiveSegment;

    const DAY: Duration = Duration::from_secs(SECS_PER_DAY);

    fn write_aged(path: &Path, age: Duration, now: SystemTime) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"recording").unwrap();
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(now - age).unwrap();
    }

    #[tokio::test]
    async fn test_deletes_only_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        let old = dir.path().join("2024-01-01/cam1_old.mkv");
        let young = dir.path().join("2024-01-03/cam1_young.mkv");
        write_aged(&old, DAY * 8, now);
        write_aged(&young, DAY * 6, now);

        let active = ActiveSegment::new();
        let sweeper =
            RetentionSweeper::new(RetentionPolicy::new(dir.path(), 7), active.subscribe());
        let report = sweeper.sweep_at(now).await;

        assert_eq!(report.deleted, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.bytes_freed, 9);
        assert!(!old.exists());
        assert!(young.exists());
        // The emptied day directory is pruned, the root is kept.
        assert_eq!(report.dirs_removed, 1);
        assert!(!old.parent().unwrap().exists());
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_active_segment_is_never_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        let path = dir.path().join("2024-01-01/cam1_active.ts");
        write_aged(&path, DAY * 30, now);

        let active = ActiveSegment::new();
        active.set(&path);
        let sweeper =
            RetentionSweeper::new(RetentionPolicy::new(dir.path(), 7), active.subscribe());
        let report = sweeper.sweep_at(now).await;

        assert_eq!(report.deleted, 0);
        assert_eq!(report.skipped, 1);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_second_sweep_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        write_aged(&dir.path().join("a/x.mkv"), DAY * 10, now);
        write_aged(&dir.path().join("a/y.mkv"), DAY * 9, now);
        write_aged(&dir.path().join("b/z.mkv"), DAY, now);

        let sweeper = RetentionSweeper::new(
            RetentionPolicy::new(dir.path(), 7),
            ActiveSegment::new().subscribe(),
        );
        assert_eq!(sweeper.sweep_at(now).await.deleted, 2);

        let second = sweeper.sweep_at(now).await;
        assert_eq!(second.deleted, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(second.dirs_removed, 0);
    }

    #[tokio::test]
    async fn test_zero_days_disables_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        let path = dir.path().join("old.mkv");
        write_aged(&path, DAY * 365, now);

        let sweeper = RetentionSweeper::new(
            RetentionPolicy::new(dir.path(), 0),
            ActiveSegment::new().subscribe(),
        );
        assert_eq!(sweeper.sweep_at(now).await, SweepReport::default());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_dry_run_keeps_files() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        let path = dir.path().join("d/old.mkv");
        write_aged(&path, DAY * 8, now);

        let sweeper = RetentionSweeper::new(
            RetentionPolicy::new(dir.path(), 7),
            ActiveSegment::new().subscribe(),
        )
        .with_dry_run(true);
        let report = sweeper.sweep_at(now).await;

        assert_eq!(report.deleted, 1);
        assert_eq!(report.dirs_removed, 0);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_missing_root_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let sweeper = RetentionSweeper::new(
            RetentionPolicy::new(dir.path().join("not-created"), 7),
            ActiveSegment::new().subscribe(),
        );
        assert_eq!(sweeper.sweep().await, SweepReport::default());
    }

    #[tokio::test]
    async fn test_nested_empty_dirs_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b/c")).unwrap();

        let sweeper = RetentionSweeper::new(
            RetentionPolicy::new(dir.path(), 7),
            ActiveSegment::new().subscribe(),
        );
        let report = sweeper.sweep().await;
        assert_eq!(report.dirs_removed, 3);
        assert!(!dir.path().join("a").exists());
    }
}
