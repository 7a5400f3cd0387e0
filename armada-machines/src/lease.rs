//! Machine API seam and lease ownership.
//!
//! [`LeasedMachine::acquire`] takes the [`Machine`] by value, so a machine
//! cannot be leased a second time while a lease on it is held.
//! [`LeasedMachine::release`] hands the machine back. A lease dropped without
//! release (for example when the owning future is cancelled) is released from
//! a background task if a tokio runtime is available.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use armada_core::{Lease, Machine, MachineConfig, MachineId};

use crate::error::{LeaseError, MachineApiError};

/// Configuration submitted when updating a machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchInput {
    pub name: String,
    pub region: String,
    pub config: MachineConfig,
}

impl LaunchInput {
    pub fn from_machine(machine: &Machine) -> Self {
        Self {
            name: machine.name.clone(),
            region: machine.region.clone(),
            config: machine.config.clone(),
        }
    }
}

/// Remote machine operations.
#[async_trait]
pub trait MachineApi: Send + Sync {
    /// Machines that are not destroyed or being destroyed.
    async fn list_active(&self) -> Result<Vec<Machine>, MachineApiError>;

    async fn acquire_lease(&self, id: &MachineId, ttl: Duration) -> Result<Lease, MachineApiError>;

    /// Apply `input`; `nonce` proves lease ownership.
    async fn update(
        &self,
        id: &MachineId,
        nonce: &str,
        input: &LaunchInput,
    ) -> Result<Machine, MachineApiError>;

    async fn release_lease(&self, id: &MachineId, nonce: &str) -> Result<(), MachineApiError>;
}

/// A machine together with the lease that grants exclusive mutation.
pub struct LeasedMachine {
    api: Arc<dyn MachineApi>,
    machine: Machine,
    lease: Lease,
    released: bool,
}

impl std::fmt::Debug for LeasedMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeasedMachine")
            .field("machine", &self.machine.id)
            .field("expires_at", &self.lease.expires_at)
            .field("released", &self.released)
            .finish()
    }
}

impl LeasedMachine {
    pub async fn acquire(
        api: Arc<dyn MachineApi>,
        machine: Machine,
        ttl: Duration,
    ) -> Result<Self, LeaseError> {
        let lease = api
            .acquire_lease(&machine.id, ttl)
            .await
            .map_err(|source| LeaseError::Acquire {
                id: machine.id.clone(),
                source,
            })?;
        tracing::debug!(machine = %machine.id, expires_at = %lease.expires_at, "lease acquired");
        Ok(Self {
            api,
            machine,
            lease,
            released: false,
        })
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /// Update under the held lease; the stored machine reflects the result.
    pub async fn update(&mut self, input: &LaunchInput) -> Result<(), MachineApiError> {
        let updated = self
            .api
            .update(&self.machine.id, &self.lease.nonce, input)
            .await?;
        self.machine = updated;
        Ok(())
    }

    /// Give the lease back. Release failures are logged; the lease then
    /// lapses at its expiry.
    pub async fn release(mut self) -> Machine {
        if let Err(err) = self
            .api
            .release_lease(&self.machine.id, &self.lease.nonce)
            .await
        {
            tracing::warn!(machine = %self.machine.id, error = %err, "failed to release lease");
        } else {
            tracing::debug!(machine = %self.machine.id, "lease released");
        }
        self.released = true;
        self.machine.clone()
    }
}

impl Drop for LeasedMachine {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                machine = %self.machine.id,
                expires_at = %self.lease.expires_at,
                "lease dropped without release; it lapses at expiry"
            );
            return;
        };

        tracing::debug!(machine = %self.machine.id, "lease dropped; releasing in background");
        let api = Arc::clone(&self.api);
        let id = self.machine.id.clone();
        let nonce = self.lease.nonce.clone();
        let expires_at = self.lease.expires_at;
        runtime.spawn(async move {
            if let Err(err) = api.release_lease(&id, &nonce).await {
                tracing::warn!(machine = %id, error = %err, %expires_at, "background lease release failed");
            }
        });
    }
}
