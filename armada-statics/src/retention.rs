//! Garbage collection of old version directories.

use crate::error::StaticsError;
use crate::paths;
use crate::sync::AssetSynchronizer;

/// Default number of most recent versions kept.
pub const DEFAULT_KEEP_VERSIONS: usize = 3;

/// What a retention pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    /// Versions newer than the current release, removed unconditionally.
    pub too_new: Vec<u64>,
    /// Versions beyond the retained count, oldest first.
    pub expired: Vec<u64>,
}

impl RetentionReport {
    pub fn deleted(&self) -> impl Iterator<Item = u64> + '_ {
        self.too_new.iter().chain(self.expired.iter()).copied()
    }
}

/// Deletes version directories under one storage root.
#[derive(Debug, Clone)]
pub struct RetentionManager {
    sync: AssetSynchronizer,
    storage_root: String,
    keep: usize,
}

impl RetentionManager {
    pub fn new(sync: AssetSynchronizer, storage_root: impl Into<String>, keep: usize) -> Self {
        Self {
            sync,
            storage_root: storage_root.into(),
            keep: keep.max(1),
        }
    }

    /// Keep exactly the `keep` newest versions not greater than `current`.
    /// At least one version is always kept, so `current` itself survives.
    ///
    /// Versions above `current` are left over from an earlier app with the
    /// same name and are always deleted. Only the first listing page is read.
    pub async fn delete_old_versions(
        &self,
        app: &str,
        current: u64,
    ) -> Result<RetentionReport, StaticsError> {
        let app_root = paths::app_root(&self.storage_root, app);
        let page = self.sync.handle().list(&app_root, Some("/")).await?;

        let mut versions: Vec<u64> = page
            .common_prefixes
            .iter()
            .filter_map(|prefix| {
                let parsed = paths::parse_version(&app_root, prefix);
                if parsed.is_none() {
                    tracing::debug!(prefix = %prefix, "skipping non-version prefix");
                }
                parsed
            })
            .collect();
        versions.sort_unstable();
        versions.dedup();

        let mut report = RetentionReport::default();
        let (valid, too_new): (Vec<u64>, Vec<u64>) =
            versions.into_iter().partition(|v| *v <= current);

        for version in too_new {
            tracing::debug!(app, version, current, "deleting too-new static dir (likely for reused app name)");
            self.delete_version(app, version).await?;
            report.too_new.push(version);
        }

        if valid.len() > self.keep {
            let excess = valid.len() - self.keep;
            for &version in &valid[..excess] {
                tracing::debug!(app, version, "deleting old static dir");
                self.delete_version(app, version).await?;
                report.expired.push(version);
            }
        }

        Ok(report)
    }

    async fn delete_version(&self, app: &str, version: u64) -> Result<(), StaticsError> {
        let dir = paths::version_root(&self.storage_root, app, version);
        self.sync.delete_directory(&dir).await?;
        Ok(())
    }
}
