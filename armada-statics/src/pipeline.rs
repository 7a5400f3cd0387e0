//! Statics deployment pipeline: initialize → push → finalize.
//!
//! Every step receives an explicit [`StaticsContext`] produced by
//! [`StaticsPipeline::initialize`]; nothing is shared implicitly between steps.
//! The configuration is rewritten in place: sync candidates are removed at
//! initialization and replaced by bucket-backed entries after a successful
//! push.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use armada_core::telemetry::init_tracing;
use armada_core::{AppConfig, AppIdentity, AppName, OrgIdentity, Settings, StaticAssetSpec};
use armada_provision::{BucketProvisioner, SealedCredential};

use crate::error::{io_err, StaticsError};
use crate::paths;
use crate::recovery::{self, CleanupOutcome};
use crate::retention::{RetentionManager, RetentionReport};
use crate::store::{BucketHandle, ObjectStoreConnector, StoreTarget};
use crate::sync::{AssetSynchronizer, UploadSummary};

/// Whether any static in `config` is pushed to the managed bucket.
pub fn uses_bucket_sync(config: &AppConfig) -> bool {
    config.has_sync_candidates()
}

/// The release being deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub version: u64,
    /// Directory that relative guest paths are resolved against.
    pub source_root: PathBuf,
}

impl Release {
    pub fn new(version: u64, source_root: impl Into<PathBuf>) -> Self {
        Self {
            version,
            source_root: source_root.into(),
        }
    }
}

/// State carried from initialization to push and finalize.
#[derive(Debug, Clone)]
pub struct StaticsContext {
    pub sync: AssetSynchronizer,
    pub bucket: String,
    pub sealed_credential: SealedCredential,
    pub app_name: AppName,
    pub release: Release,
    /// `<root>/<app>/<version>`.
    pub version_root: String,
    /// Statics as declared, before candidates were stripped.
    pub original_statics: Vec<StaticAssetSpec>,
    pub storage_root: String,
    pub keep_versions: usize,
    pub cleanup_timeout: Duration,
}

/// Result of a successful push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Bucket-backed entries appended to the configuration.
    pub statics: Vec<StaticAssetSpec>,
    pub uploads: Vec<UploadSummary>,
}

impl PushReport {
    pub fn files_uploaded(&self) -> usize {
        self.uploads.iter().map(|u| u.uploaded).sum()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Provisioning and storage collaborators plus the settings they run with.
pub struct StaticsPipeline {
    provisioner: BucketProvisioner,
    connector: Arc<dyn ObjectStoreConnector>,
    settings: Settings,
}

impl StaticsPipeline {
    pub fn new(
        provisioner: BucketProvisioner,
        connector: Arc<dyn ObjectStoreConnector>,
        settings: Settings,
    ) -> Self {
        Self {
            provisioner,
            connector,
            settings,
        }
    }

    /// Ensure the bucket, strip sync candidates from `config`, and connect a
    /// store client through the proxy with the sealed credential.
    pub async fn initialize(
        &self,
        app: &AppIdentity,
        org: &OrgIdentity,
        config: &mut AppConfig,
        release: Release,
    ) -> Result<StaticsContext, StaticsError> {
        let record = self
            .provisioner
            .ensure_bucket(app, org, &config.primary_region)
            .await?;

        let original_statics = config.statics.clone();
        config.statics.retain(|s| !s.is_sync_candidate());

        let target = StoreTarget::from_settings(
            &self.settings,
            record.bucket.clone(),
            record.sealed_credential.clone(),
        );
        let store = self.connector.connect(&target).await?;
        let sync = AssetSynchronizer::new(
            BucketHandle::new(store, record.bucket.clone()),
            self.settings.upload_workers,
        );

        let version_root =
            paths::version_root(&self.settings.storage_root, &config.app_name.0, release.version);
        tracing::info!(bucket = %record.bucket, version_root = %version_root, "statics initialized");

        Ok(StaticsContext {
            sync,
            bucket: record.bucket,
            sealed_credential: record.sealed_credential,
            app_name: config.app_name.clone(),
            release,
            version_root,
            original_statics,
            storage_root: self.settings.storage_root.clone(),
            keep_versions: self.settings.keep_versions,
            cleanup_timeout: self.settings.cleanup_timeout(),
        })
    }

    /// Initialize, push and finalize. `Ok(None)` when nothing needs syncing.
    pub async fn deploy_statics(
        &self,
        app: &AppIdentity,
        org: &OrgIdentity,
        config: &mut AppConfig,
        release: Release,
    ) -> Result<Option<PushReport>, StaticsError> {
        if !uses_bucket_sync(config) {
            tracing::debug!(app = %config.app_name, "no statics to sync");
            return Ok(None);
        }
        let ctx = self.initialize(app, org, config, release).await?;
        let report = push(&ctx, config).await?;
        finalize(&ctx).await;
        Ok(Some(report))
    }

    /// Blocking entry point: installs tracing, builds a runtime, and runs
    /// [`deploy_statics`](Self::deploy_statics) on it.
    pub fn deploy_statics_blocking(
        &self,
        app: &AppIdentity,
        org: &OrgIdentity,
        config: &mut AppConfig,
        release: Release,
    ) -> Result<Option<PushReport>, StaticsError> {
        init_tracing();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| io_err("tokio-runtime", e))?;
        runtime.block_on(self.deploy_statics(app, org, config, release))
    }
}

// ---------------------------------------------------------------------------
// Push / finalize
// ---------------------------------------------------------------------------

/// Upload every candidate static and append its bucket-backed entry.
///
/// The upload runs in its own task. An error or a panic in that task both
/// arrive here as a `StaticsError`, and either one triggers a single cleanup
/// of the version directory before the error is returned.
pub async fn push(ctx: &StaticsContext, config: &mut AppConfig) -> Result<PushReport, StaticsError> {
    let task_ctx = ctx.clone();
    let outcome = match tokio::spawn(async move { upload_candidates(&task_ctx).await }).await {
        Ok(result) => result,
        Err(join_err) if join_err.is_panic() => {
            Err(StaticsError::PushPanicked(panic_message(join_err.into_panic())))
        }
        Err(_) => Err(StaticsError::Cancelled),
    };

    match outcome {
        Ok(report) => {
            config.statics.extend(report.statics.iter().cloned());
            tracing::info!(
                statics = report.statics.len(),
                files = report.files_uploaded(),
                "statics pushed"
            );
            Ok(report)
        }
        Err(err) => {
            let cleanup: CleanupOutcome =
                recovery::cleanup_after_failure(&ctx.sync, &ctx.version_root, ctx.cleanup_timeout)
                    .await;
            tracing::debug!(?cleanup, "statics push failed");
            Err(err)
        }
    }
}

/// Garbage-collect old versions. Failures are logged, never returned.
pub async fn finalize(ctx: &StaticsContext) -> Option<RetentionReport> {
    let manager = RetentionManager::new(
        ctx.sync.clone(),
        ctx.storage_root.clone(),
        ctx.keep_versions,
    );
    match manager
        .delete_old_versions(&ctx.app_name.0, ctx.release.version)
        .await
    {
        Ok(report) => Some(report),
        Err(err) => {
            tracing::warn!(app = %ctx.app_name, error = %err, "failed to delete old statics");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

async fn upload_candidates(ctx: &StaticsContext) -> Result<PushReport, StaticsError> {
    let mut report = PushReport::default();
    let candidates = ctx
        .original_statics
        .iter()
        .filter(|s| s.is_sync_candidate());

    for (index, spec) in candidates.enumerate() {
        let dest = paths::static_dest(&ctx.version_root, index);
        let local = resolve_local(&ctx.release.source_root, &spec.guest_path);
        let summary = ctx.sync.upload_directory(&dest, &local).await?;

        report.statics.push(StaticAssetSpec {
            guest_path: format!("/{dest}"),
            url_prefix: spec.url_prefix.clone(),
            bucket: Some(ctx.bucket.clone()),
            index_document: spec.index_document.clone(),
        });
        report.uploads.push(summary);
    }
    Ok(report)
}

fn resolve_local(source_root: &Path, guest_path: &str) -> PathBuf {
    source_root.join(guest_path.trim_end_matches('/'))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
