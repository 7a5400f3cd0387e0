//! Object-storage seam.
//!
//! The storage server and the credential-forwarding proxy are external; the
//! synchronizer only talks to them through [`ObjectStore`]. A connected store
//! is bound to one bucket by [`BucketHandle`], which is cheap to clone and is
//! shared by every upload worker.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use armada_core::Settings;
use armada_provision::SealedCredential;

use crate::error::StoreError;

/// Maximum number of keys a single `delete_objects` call may carry.
pub const MAX_DELETE_BATCH: usize = 1000;

/// Information about a stored object from a list operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
}

/// One page of a list operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<ObjectInfo>,
    /// Populated only when a delimiter was supplied.
    pub common_prefixes: Vec<String>,
}

/// Low-level object operations; implementations must tolerate concurrent use.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError>;

    /// List objects under `prefix`. With a delimiter, keys containing it past
    /// the prefix are rolled up into `common_prefixes`.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<ListPage, StoreError>;

    /// Delete at most [`MAX_DELETE_BATCH`] keys.
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Connecting through the proxy
// ---------------------------------------------------------------------------

/// Everything needed to build a store client that routes through the
/// authenticating proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreTarget {
    pub bucket: String,
    pub endpoint: String,
    pub proxy_url: String,
    pub sealed_credential: SealedCredential,
}

impl StoreTarget {
    pub fn from_settings(
        settings: &Settings,
        bucket: impl Into<String>,
        sealed_credential: SealedCredential,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            endpoint: settings.storage_endpoint(),
            proxy_url: settings.proxy_url.clone(),
            sealed_credential,
        }
    }
}

/// Builds [`ObjectStore`] clients for a target.
#[async_trait]
pub trait ObjectStoreConnector: Send + Sync {
    async fn connect(&self, target: &StoreTarget) -> Result<Arc<dyn ObjectStore>, StoreError>;
}

// ---------------------------------------------------------------------------
// Bucket handle
// ---------------------------------------------------------------------------

/// A store client bound to a single bucket.
#[derive(Clone)]
pub struct BucketHandle {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl fmt::Debug for BucketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketHandle")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl BucketHandle {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        self.store
            .put_object(&self.bucket, key, body, content_type)
            .await
    }

    pub async fn list(&self, prefix: &str, delimiter: Option<&str>) -> Result<ListPage, StoreError> {
        self.store.list_objects(&self.bucket, prefix, delimiter).await
    }

    /// Delete `keys`, splitting them into batches the store accepts.
    pub async fn delete(&self, keys: &[String]) -> Result<(), StoreError> {
        for batch in keys.chunks(MAX_DELETE_BATCH) {
            self.store.delete_objects(&self.bucket, batch).await?;
        }
        Ok(())
    }
}
