//! Output directory checks.

use std::path::Path;

use tracing::debug;

use crate::{Error, Result};

/// Create `root` if missing and make sure files can be created in it.
///
/// Runs once before the first connection; a read-only mount is a startup
/// error rather than a stream of failed segments.
pub async fn prepare_output_root(root: &Path) -> Result<()> {
    tokio::fs::create_dir_all(root)
        .await
        .map_err(|e| Error::io_path("creating output root", root, e))?;

    let marker = root.join(format!(".rtsp-grab-write-check-{}", std::process::id()));
    tokio::fs::write(&marker, b"")
        .await
        .map_err(|e| Error::io_path("writing to output root", root, e))?;
    if let Err(e) = tokio::fs::remove_file(&marker).await {
        debug!(path = %marker.display(), error = %e, "Could not remove write check file");
    }
    Ok(())
}
