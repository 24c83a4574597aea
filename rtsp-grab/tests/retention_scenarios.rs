//! Retention against a real directory tree.

use std::path::Path;
use std::time::{Duration, SystemTime};

use rtsp_grab::retention::{RetentionPolicy, RetentionService, RetentionSweeper};
use rtsp_grab::supervisor::ActiveSegment;
use tokio_util::sync::CancellationToken;

const DAY: Duration = Duration::from_secs(86_400);

fn recording(root: &Path, day: &str, name: &str, age: Duration) -> std::path::PathBuf {
    let dir = root.join(day);
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, vec![0u8; 188]).unwrap();
    let file = std::fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
    path
}

#[tokio::test]
async fn test_week_old_files_go_recent_ones_stay() {
    let dir = tempfile::tempdir().unwrap();
    let expired = recording(dir.path(), "2024-05-24", "cam1_2024-05-24_10-00-00.mkv", 8 * DAY);
    let recent = recording(dir.path(), "2024-05-26", "cam1_2024-05-26_10-00-00.mkv", 6 * DAY);

    let active = ActiveSegment::new();
    let sweeper = RetentionSweeper::new(RetentionPolicy::new(dir.path(), 7), active.subscribe());

    let first = sweeper.sweep().await;
    assert_eq!(first.deleted, 1);
    assert_eq!(first.bytes_freed, 188);
    assert!(!expired.exists());
    assert!(!dir.path().join("2024-05-24").exists());
    assert!(recent.exists());

    let second = sweeper.sweep().await;
    assert_eq!(second.deleted, 0);
    assert_eq!(second.dirs_removed, 0);
    assert!(recent.exists());
}

#[tokio::test]
async fn test_segment_being_written_is_never_deleted() {
    let dir = tempfile::tempdir().unwrap();
    // A stale mtime on the open segment must not get it removed.
    let current = recording(dir.path(), "2024-05-20", "cam1_2024-05-20_23-00-00.ts", 30 * DAY);

    let active = ActiveSegment::new();
    active.set(&current);
    let sweeper = RetentionSweeper::new(RetentionPolicy::new(dir.path(), 7), active.subscribe());

    let report = sweeper.sweep().await;
    assert_eq!(report.deleted, 0);
    assert!(current.exists());

    active.clear();
    let report = sweeper.sweep().await;
    assert_eq!(report.deleted, 1);
    assert!(!current.exists());
}

#[tokio::test]
async fn test_background_task_sweeps_immediately_and_stops_on_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let expired = recording(dir.path(), "2024-05-01", "cam1_2024-05-01_00-00-00.mp4", 10 * DAY);

    let active = ActiveSegment::new();
    let sweeper = RetentionSweeper::new(RetentionPolicy::new(dir.path(), 7), active.subscribe());
    let cancel = CancellationToken::new();
    let handle = RetentionService::new(sweeper, Duration::from_secs(3600))
        .start_background_task(cancel.clone());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while expired.exists() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!expired.exists());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
