//! Compensating cleanup after a failed push.

use std::time::Duration;

use crate::sync::AssetSynchronizer;

/// Default bound on the cleanup attempt.
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

/// How a cleanup attempt ended. Never an error: cleanup is best-effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    Removed(usize),
    Failed,
    TimedOut,
}

/// Delete the partially written version directory `version_root`.
///
/// Runs under its own timeout so an already cancelled push cannot stop it.
/// Failures are logged and reported through the outcome only.
pub async fn cleanup_after_failure(
    sync: &AssetSynchronizer,
    version_root: &str,
    timeout: Duration,
) -> CleanupOutcome {
    tracing::debug!(version_root, "cleaning up failed statics push");
    match tokio::time::timeout(timeout, sync.delete_directory(version_root)).await {
        Ok(Ok(removed)) => {
            tracing::info!(version_root, removed, "removed incomplete statics push");
            CleanupOutcome::Removed(removed)
        }
        Ok(Err(err)) => {
            tracing::warn!(version_root, error = %err, "failed to delete statics");
            CleanupOutcome::Failed
        }
        Err(_) => {
            tracing::warn!(version_root, ?timeout, "timed out deleting statics");
            CleanupOutcome::TimedOut
        }
    }
}
