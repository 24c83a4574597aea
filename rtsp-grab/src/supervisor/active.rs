//! The segment currently being written, shared with the retention task.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;

/// Publishes the path of the segment being recorded.
///
/// Cloning shares the same channel. Readers either hold a clone or a
/// [`watch::Receiver`] from [`ActiveSegment::subscribe`].
#[derive(Debug, Clone)]
pub struct ActiveSegment {
    tx: Arc<watch::Sender<Option<PathBuf>>>,
}

impl ActiveSegment {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self, path: impl Into<PathBuf>) {
        self.tx.send_replace(Some(path.into()));
    }

    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    pub fn current(&self) -> Option<PathBuf> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<PathBuf>> {
        self.tx.subscribe()
    }
}

impl Default for ActiveSegment {
    fn default() -> Self {
        Self::new()
    }
}
