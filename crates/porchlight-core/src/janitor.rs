//! Output directory janitor
//!
//! Leaves the video output directory present and empty so the readiness
//! watcher can never match a manifest left behind by an earlier run.

use crate::{Error, Result};
use std::path::Path;
use tracing::{debug, instrument};

/// Create `dir` if needed, then delete every entry directly inside it.
///
/// Returns the number of entries removed. Nested directories are removed
/// recursively; only flat segment files are expected in practice.
#[instrument(skip_all, fields(path = %dir.display()))]
pub async fn reset(dir: &Path) -> Result<usize> {
    let wrap = |source: std::io::Error| Error::DirectoryReset {
        path: dir.to_path_buf(),
        source,
    };

    tokio::fs::create_dir_all(dir).await.map_err(wrap)?;

    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(dir).await.map_err(wrap)?;
    while let Some(entry) = entries.next_entry().await.map_err(wrap)? {
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(wrap)?;

        if file_type.is_dir() {
            tokio::fs::remove_dir_all(&path).await.map_err(wrap)?;
        } else {
            tokio::fs::remove_file(&path).await.map_err(wrap)?;
        }
        removed += 1;
    }

    debug!(removed, "Output directory reset");
    Ok(removed)
}
