//! # armada-provision
//!
//! Scoped credential sealing and idempotent bucket provisioning.
//!
//! [`BucketProvisioner::ensure_bucket`] finds or creates the per-application
//! statics bucket and returns a [`BucketRecord`] carrying a
//! [`SealedCredential`] minted by [`CredentialIssuer`].

pub mod credential;
pub mod error;
pub mod names;
pub mod provisioner;

pub use credential::{AccessScope, Action, CredentialIssuer, ProcessorSecrets, SealedCredential};
pub use error::{CredentialError, ProvisionError, ResourceError};
pub use provisioner::{
    BucketMetadata, BucketOptions, BucketProvisioner, BucketRecord, CreateResourceRequest,
    CreatedResource, ManagedResource, MetadataLookup, ResourceApi,
};
