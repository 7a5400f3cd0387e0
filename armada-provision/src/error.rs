//! Error types for armada-provision.

use thiserror::Error;

use armada_core::ConfigError;

/// Failures while minting or inspecting a sealed credential.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to decode org ID for {slug}: {source}")]
    InvalidOrgId {
        slug: String,
        #[source]
        source: std::num::ParseIntError,
    },

    /// A required processor secret was absent or empty.
    #[error("missing processor secret `{0}`")]
    MissingSecret(&'static str),

    #[error("seal key error: {0}")]
    SealKey(#[from] ConfigError),

    #[error("credential payload JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sealing failed: {0}")]
    Seal(String),

    #[error("sealed credential is malformed: {0}")]
    Malformed(String),

    #[error("unsupported sealed credential version: {0}")]
    UnsupportedVersion(u8),

    #[error("invalid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
}

/// Errors reported by the managed-resource API.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The requested resource name is already taken.
    #[error("name `{name}` is unavailable: {message}")]
    NameUnavailable { name: String, message: String },

    #[error("resource `{0}` not found")]
    NotFound(String),

    #[error("resource API error: {0}")]
    Api(String),
}

impl ResourceError {
    /// Whether the failure means "pick another name".
    ///
    /// Generated API clients often surface the collision only as message
    /// text, so plain `Api` errors are matched on the known phrasings too.
    pub fn is_name_collision(&self) -> bool {
        match self {
            ResourceError::NameUnavailable { .. } => true,
            ResourceError::Api(message) => {
                message.contains("already exists for app")
                    || message.contains("unavailable for creation")
            }
            ResourceError::NotFound(_) => false,
        }
    }
}

/// All errors that can arise from bucket provisioning.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("metadata JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
