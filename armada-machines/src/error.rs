//! Error types for armada-machines.

use thiserror::Error;

use armada_core::MachineId;

use crate::guest::InvalidConfig;

/// Errors reported by the machine API.
#[derive(Debug, Error)]
pub enum MachineApiError {
    /// The machine rejected the submitted configuration.
    #[error("invalid machine config: {0}")]
    InvalidConfig(InvalidConfig),

    #[error("machine {0} not found")]
    NotFound(MachineId),

    /// Another holder owns the lease, or the presented nonce is stale.
    #[error("lease conflict on machine {id}: {message}")]
    LeaseConflict { id: MachineId, message: String },

    #[error("machine API error: {0}")]
    Api(String),
}

/// All errors that can arise from lease-guarded machine updates.
#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("failed to acquire lease on machine {id}: {source}")]
    Acquire {
        id: MachineId,
        #[source]
        source: MachineApiError,
    },

    #[error("failed to update machine {id}: {source}")]
    Update {
        id: MachineId,
        #[source]
        source: MachineApiError,
    },

    #[error("failed to list machines: {0}")]
    List(#[source] MachineApiError),

    #[error("unknown machine size `{0}`")]
    UnknownSize(String),

    #[error("no active machines in process group '{0}'")]
    NoMachinesInGroup(String),

    /// Scaling needs an explicit group when the app declares several.
    #[error(
        "scaling an app with multiple process groups requires specifying a group; this app has: {}",
        .0.join(", ")
    )]
    AmbiguousProcessGroup(Vec<String>),
}
