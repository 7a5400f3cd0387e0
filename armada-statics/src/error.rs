//! Error types for armada-statics.

use std::path::PathBuf;

use thiserror::Error;

use armada_core::ConfigError;
use armada_provision::ProvisionError;

/// Failures reported by an [`ObjectStore`](crate::store::ObjectStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("put `{key}` failed: {message}")]
    Put { key: String, message: String },

    #[error("list `{prefix}` failed: {message}")]
    List { prefix: String, message: String },

    #[error("delete of {count} objects failed: {message}")]
    Delete { count: usize, message: String },

    /// A delete request exceeded the per-call key limit.
    #[error("delete batch of {0} keys exceeds the per-request limit")]
    BatchTooLarge(usize),

    #[error("could not connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },
}

/// All errors that can arise while synchronizing statics.
#[derive(Debug, Error)]
pub enum StaticsError {
    #[error("object store error: {0}")]
    Store(#[from] StoreError),

    #[error("provisioning error: {0}")]
    Provision(#[from] ProvisionError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// The upload stopped because its cancellation token fired.
    #[error("upload cancelled")]
    Cancelled,

    /// The push task panicked; the payload message is preserved.
    #[error("statics push panicked: {0}")]
    PushPanicked(String),
}

/// Convenience constructor for [`StaticsError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StaticsError {
    StaticsError::Io {
        path: path.into(),
        source,
    }
}
