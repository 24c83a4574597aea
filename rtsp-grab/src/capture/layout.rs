//! Segment file naming.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::capture::StreamError;
use crate::config::Container;
use crate::utils::filename::sanitize_filename;

const DAY_DIR_FORMAT: &str = "%Y-%m-%d";
const STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Upper bound on `_N` suffixes tried for a colliding name.
const MAX_COLLISION_SUFFIX: u32 = 1000;

/// Maps a segment start time to its path:
/// `<root>/<YYYY-MM-DD>/<camera>_<YYYY-MM-DD_HH-MM-SS>.<ext>`.
#[derive(Debug, Clone)]
pub struct SegmentLayout {
    root: PathBuf,
    camera: String,
    container: Container,
}

impl SegmentLayout {
    pub fn new(root: impl Into<PathBuf>, camera: &str, container: Container) -> Self {
        Self {
            root: root.into(),
            camera: sanitize_filename(camera.trim()),
            container,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    pub fn container(&self) -> Container {
        self.container
    }

    /// Directory holding the segments started on `start`'s day.
    pub fn day_dir(&self, start: DateTime<Local>) -> PathBuf {
        self.root.join(start.format(DAY_DIR_FORMAT).to_string())
    }

    /// Path for a segment starting at `start`, ignoring collisions.
    pub fn segment_path(&self, start: DateTime<Local>) -> PathBuf {
        self.day_dir(start).join(self.file_name(start, None))
    }

    fn file_name(&self, start: DateTime<Local>, suffix: Option<u32>) -> String {
        let stamp = start.format(STAMP_FORMAT);
        match suffix {
            Some(n) => format!("{}_{}_{}.{}", self.camera, stamp, n, self.container.extension()),
            None => format!("{}_{}.{}", self.camera, stamp, self.container.extension()),
        }
    }

    /// Create the day directory and pick a path that does not exist yet.
    pub async fn prepare(&self, start: DateTime<Local>) -> Result<PathBuf, StreamError> {
        let dir = self.day_dir(start);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StreamError::sink(&dir, e))?;

        let first = dir.join(self.file_name(start, None));
        if !exists(&first).await {
            return Ok(first);
        }
        for n in 1..=MAX_COLLISION_SUFFIX {
            let candidate = dir.join(self.file_name(start, Some(n)));
            if !exists(&candidate).await {
                return Ok(candidate);
            }
        }
        Err(StreamError::sink(
            first,
            std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "no free segment name for this start time",
            ),
        ))
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(true)
}
