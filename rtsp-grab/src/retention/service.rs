//! Periodic retention task.

use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{RetentionSweeper, SpaceGuard, SpaceReport, SweepReport};

/// Reports of one retention pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetentionPassReport {
    pub sweep: SweepReport,
    pub space: Option<SpaceReport>,
}

/// Runs the age sweep followed by the space guard.
pub struct RetentionService {
    sweeper: RetentionSweeper,
    space_guard: Option<SpaceGuard>,
    interval: Duration,
}

impl RetentionService {
    pub fn new(sweeper: RetentionSweeper, interval: Duration) -> Self {
        Self {
            sweeper,
            space_guard: None,
            interval,
        }
    }

    /// Attach a space guard; it is skipped when its thresholds are disabled.
    pub fn with_space_guard(mut self, guard: SpaceGuard) -> Self {
        if guard.policy().is_enabled() {
            self.space_guard = Some(guard);
        }
        self
    }

    pub async fn run_once(&mut self) -> RetentionPassReport {
        let sweep = self.sweeper.sweep().await;
        let space = match self.space_guard.as_mut() {
            Some(guard) => Some(guard.enforce().await),
            None => None,
        };
        RetentionPassReport { sweep, space }
    }

    /// Run a pass immediately and then every interval until cancelled.
    pub fn start_background_task(mut self, cancellation_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                root = %self.sweeper.policy().root.display(),
                retention_days = self.sweeper.policy().max_age_days,
                interval_secs = self.interval.as_secs(),
                space_guard = self.space_guard.is_some(),
                "Retention service started"
            );

            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        info!("Retention service shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let report = self.run_once().await;
                        debug!(?report, "Retention pass completed");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retention::{DiskProbe, DiskUsage, RetentionPolicy, SpacePolicy};
    use crate::supervisor::ActiveSegment;
    use std::path::Path;
    use std::time::SystemTime;

    struct FullDisk;

    impl DiskProbe for FullDisk {
        fn usage(&mut self, _path: &Path) -> Option<DiskUsage> {
            Some(DiskUsage {
                total_bytes: 100,
                available_bytes: 0,
            })
        }
    }

    fn aged(path: &Path, days: u64) {
        std::fs::write(path, b"data").unwrap();
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(days * 86_400))
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_once_runs_sweep_then_space_guard() {
        let dir = tempfile::tempdir().unwrap();
        aged(&dir.path().join("old.mkv"), 10);
        aged(&dir.path().join("new.mkv"), 1);

        let active = ActiveSegment::new();
        let sweeper = RetentionSweeper::new(RetentionPolicy::new(dir.path(), 7), active.subscribe());
        let guard = SpaceGuard::new(
            dir.path(),
            SpacePolicy {
                min_free_percent: 10.0,
                ..SpacePolicy::default()
            },
            FullDisk,
            active.subscribe(),
        );
        let mut service =
            RetentionService::new(sweeper, Duration::from_secs(60)).with_space_guard(guard);

        let report = service.run_once().await;
        assert_eq!(report.sweep.deleted, 1);
        // The disk never frees up, so the guard removes the remaining recording.
        assert_eq!(report.space.unwrap().deleted, 1);
        assert!(!dir.path().join("new.mkv").exists());
    }

    #[tokio::test]
    async fn test_disabled_space_guard_is_not_attached() {
        let dir = tempfile::tempdir().unwrap();
        let active = ActiveSegment::new();
        let sweeper = RetentionSweeper::new(RetentionPolicy::new(dir.path(), 7), active.subscribe());
        let guard = SpaceGuard::new(dir.path(), SpacePolicy::default(), FullDisk, active.subscribe());

        let mut service =
            RetentionService::new(sweeper, Duration::from_secs(60)).with_space_guard(guard);
        assert!(service.run_once().await.space.is_none());
    }

    #[tokio::test]
    async fn test_background_task_sweeps_at_startup_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.mkv");
        aged(&old, 30);

        let sweeper = RetentionSweeper::new(
            RetentionPolicy::new(dir.path(), 7),
            ActiveSegment::new().subscribe(),
        );
        let cancel = CancellationToken::new();
        let handle = RetentionService::new(sweeper, Duration::from_secs(3600))
            .start_background_task(cancel.clone());

        for _ in 0..100 {
            if !old.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!old.exists());

        cancel.cancel();
        handle.await.unwrap();
    }
}
