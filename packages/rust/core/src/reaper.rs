//! Best-effort removal of a run's work directory.

use std::path::Path;

use tracing::{debug, warn};

/// Recursively delete `work_dir`. Returns whether it was removed; a failure
/// is only logged.
pub async fn reap(work_dir: &Path) -> bool {
    match tokio::fs::remove_dir_all(work_dir).await {
        Ok(()) => {
            debug!(path = %work_dir.display(), "work directory removed");
            true
        }
        Err(e) => {
            warn!(path = %work_dir.display(), error = %e, "could not delete work directory");
            false
        }
    }
}
