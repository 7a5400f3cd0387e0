//! Idempotent per-application bucket provisioning.
//!
//! ## `ensure_bucket`: 4-step protocol
//!
//! 1. List managed resources of the storage provider; reuse the one whose
//!    metadata names this app (no new credential is minted).
//! 2. Otherwise create `<app>-statics`, retrying once with a random suffix on
//!    a name collision.
//! 3. Seal the returned processor secrets and persist `{app id, credential}`
//!    as the resource's metadata.
//! 4. If step 3 fails, delete the just-created resource before propagating.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use armada_core::{AppIdentity, OrgIdentity, Settings};

use crate::credential::{CredentialIssuer, ProcessorSecrets, SealedCredential};
use crate::error::{ProvisionError, ResourceError};
use crate::names;

/// Metadata key holding the owning application's id.
pub const META_APP_ID: &str = "fly-statics-app-id";

/// Metadata key holding the sealed credential.
pub const META_SEALED_CREDENTIAL: &str = "fly-statics-tokenized-auth";

// ---------------------------------------------------------------------------
// Managed-resource API seam
// ---------------------------------------------------------------------------

/// A managed resource as listed by the control plane.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedResource {
    pub id: String,
    pub name: String,
    /// Free-form metadata; absent on resources nobody has annotated.
    pub metadata: Option<Value>,
}

/// Options sent when creating a statics bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketOptions {
    pub public: bool,
    pub accelerate: bool,
    pub website_domain_name: String,
}

impl Default for BucketOptions {
    fn default() -> Self {
        Self {
            public: true,
            accelerate: false,
            website_domain_name: String::new(),
        }
    }
}

/// Request to create a managed storage resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateResourceRequest {
    pub provider: String,
    pub name: String,
    pub org_slug: String,
    pub region: String,
    pub options: BucketOptions,
}

/// A newly created resource, including the raw processor secrets it exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedResource {
    pub id: String,
    pub name: String,
    pub environment: BTreeMap<String, String>,
}

/// Control-plane operations on managed resources.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    async fn list_resources(&self, provider: &str) -> Result<Vec<ManagedResource>, ResourceError>;

    async fn create_resource(
        &self,
        request: &CreateResourceRequest,
    ) -> Result<CreatedResource, ResourceError>;

    /// Replace the resource's metadata document.
    async fn update_metadata(&self, resource_id: &str, metadata: &Value)
        -> Result<(), ResourceError>;

    async fn delete_resource(&self, name: &str) -> Result<(), ResourceError>;
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Typed view of the statics metadata stored on a bucket resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketMetadata {
    #[serde(rename = "fly-statics-app-id")]
    pub app_id: String,
    #[serde(rename = "fly-statics-tokenized-auth")]
    pub sealed_credential: SealedCredential,
}

/// Outcome of decoding a resource's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataLookup {
    Missing,
    Malformed(String),
    Found(BucketMetadata),
}

impl BucketMetadata {
    /// Decode without ever failing; bad shapes become `Malformed`.
    pub fn decode(value: Option<&Value>) -> MetadataLookup {
        match value {
            None | Some(Value::Null) => MetadataLookup::Missing,
            Some(value) => match BucketMetadata::deserialize(value) {
                Ok(meta) => MetadataLookup::Found(meta),
                Err(err) => MetadataLookup::Malformed(err.to_string()),
            },
        }
    }
}

/// A bucket ready for use by this application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketRecord {
    pub bucket: String,
    pub app_id: String,
    pub sealed_credential: SealedCredential,
    /// `true` when this call created the bucket.
    pub created: bool,
}

// ---------------------------------------------------------------------------
// Provisioner
// ---------------------------------------------------------------------------

/// Finds or creates the per-application statics bucket.
pub struct BucketProvisioner {
    api: Arc<dyn ResourceApi>,
    issuer: CredentialIssuer,
    provider: String,
}

impl BucketProvisioner {
    pub fn new(
        api: Arc<dyn ResourceApi>,
        issuer: CredentialIssuer,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            api,
            issuer,
            provider: provider.into(),
        }
    }

    pub fn from_settings(
        api: Arc<dyn ResourceApi>,
        settings: &Settings,
    ) -> Result<Self, ProvisionError> {
        let issuer = CredentialIssuer::from_settings(settings)?;
        Ok(Self::new(api, issuer, settings.provider.clone()))
    }

    /// Ensure a configured bucket exists for `app`.
    ///
    /// `region` is the app's primary region; the bucket is created there.
    pub async fn ensure_bucket(
        &self,
        app: &AppIdentity,
        org: &OrgIdentity,
        region: &str,
    ) -> Result<BucketRecord, ProvisionError> {
        if let Some(existing) = self.find_existing(app).await? {
            tracing::info!(bucket = %existing.bucket, app = %app.name, "reusing statics bucket");
            return Ok(existing);
        }

        let created = self.create_bucket(app, org, region).await?;

        match self.configure(app, org, &created).await {
            Ok(sealed_credential) => {
                tracing::info!(bucket = %created.name, app = %app.name, "provisioned statics bucket");
                Ok(BucketRecord {
                    bucket: created.name,
                    app_id: app.id.clone(),
                    sealed_credential,
                    created: true,
                })
            }
            Err(err) => {
                self.rollback(&created.name).await;
                Err(err)
            }
        }
    }

    async fn find_existing(
        &self,
        app: &AppIdentity,
    ) -> Result<Option<BucketRecord>, ProvisionError> {
        let resources = self.api.list_resources(&self.provider).await?;
        for resource in resources {
            match BucketMetadata::decode(resource.metadata.as_ref()) {
                MetadataLookup::Found(meta) if meta.app_id == app.id => {
                    return Ok(Some(BucketRecord {
                        bucket: resource.name,
                        app_id: meta.app_id,
                        sealed_credential: meta.sealed_credential,
                        created: false,
                    }));
                }
                MetadataLookup::Malformed(reason) => {
                    tracing::debug!(resource = %resource.name, %reason, "skipping resource with malformed metadata");
                }
                _ => {}
            }
        }
        Ok(None)
    }

    async fn create_bucket(
        &self,
        app: &AppIdentity,
        org: &OrgIdentity,
        region: &str,
    ) -> Result<CreatedResource, ProvisionError> {
        let preferred = format!("{}-statics", app.name);
        let mut request = CreateResourceRequest {
            provider: self.provider.clone(),
            name: preferred.clone(),
            org_slug: org.slug.clone(),
            region: region.to_string(),
            options: BucketOptions::default(),
        };

        match self.api.create_resource(&request).await {
            Ok(created) => Ok(created),
            Err(err) if err.is_name_collision() => {
                request.name = names::with_random_suffix(&preferred);
                tracing::info!(taken = %preferred, retry = %request.name, "bucket name taken, retrying");
                match self.api.create_resource(&request).await {
                    Ok(created) => Ok(created),
                    Err(retry_err) => {
                        tracing::debug!(error = %retry_err, "retry with suffixed name failed");
                        Err(err.into())
                    }
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn configure(
        &self,
        app: &AppIdentity,
        org: &OrgIdentity,
        created: &CreatedResource,
    ) -> Result<SealedCredential, ProvisionError> {
        let secrets = ProcessorSecrets::from_environment(&created.environment)?;
        let sealed = self.issuer.issue(org, app, &created.name, &secrets)?;

        let metadata = serde_json::to_value(BucketMetadata {
            app_id: app.id.clone(),
            sealed_credential: sealed.clone(),
        })?;
        self.api.update_metadata(&created.id, &metadata).await?;
        Ok(sealed)
    }

    /// Best-effort compensating delete. Failure is logged, never returned.
    async fn rollback(&self, name: &str) {
        tracing::warn!(bucket = name, "rolling back partially provisioned bucket");
        if let Err(err) = self.api.delete_resource(name).await {
            tracing::warn!(bucket = name, error = %err, "failed to delete bucket during rollback");
        }
    }
}
