//! Lease-guarded configuration updates across a set of machines.
//!
//! ## Per-machine protocol
//!
//! 1. Acquire the machine's lease.
//! 2. Apply the mutation to a copy of its config and submit the update.
//! 3. On an invalid-config rejection with a known fix, correct the guest and
//!    submit once more. If no fix applies or the retry fails, the first
//!    error is the one returned.
//! 4. Release the lease, whatever happened in steps 2-3.
//!
//! Machines are processed one after another. The first failing machine
//! stops the run; machines before it stay updated.

use std::sync::Arc;
use std::time::Duration;

use armada_core::{AppConfig, GuestSpec, Machine, Settings};

use crate::error::{LeaseError, MachineApiError};
use crate::guest;
use crate::lease::{LaunchInput, LeasedMachine, MachineApi};

/// Requested change to each machine's guest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineMutation {
    /// Named preset such as `shared-cpu-2x`.
    pub size: Option<String>,
    /// Memory override applied after the preset.
    pub memory_mb: Option<u32>,
    pub cpus: Option<u32>,
}

impl MachineMutation {
    pub fn resize(size: impl Into<String>) -> Self {
        Self {
            size: Some(size.into()),
            ..Self::default()
        }
    }

    /// Reject unknown size names without touching anything.
    pub fn validate(&self) -> Result<(), LeaseError> {
        match self.size.as_deref() {
            Some(name) if guest::find_preset(name).is_none() => {
                Err(LeaseError::UnknownSize(name.to_string()))
            }
            _ => Ok(()),
        }
    }

    pub fn apply(&self, guest_spec: &mut GuestSpec) -> Result<(), LeaseError> {
        if let Some(name) = self.size.as_deref() {
            guest::apply_size(guest_spec, name)?;
        }
        if let Some(memory_mb) = self.memory_mb.filter(|m| *m > 0) {
            guest_spec.memory_mb = memory_mb;
        }
        if let Some(cpus) = self.cpus.filter(|c| *c > 0) {
            guest_spec.cpus = cpus;
        }
        Ok(())
    }
}

/// Summary of the resulting guest shape after scaling.
#[derive(Debug, Clone, PartialEq)]
pub struct VmSize {
    pub name: String,
    pub memory_mb: u32,
    pub cpu_cores: f32,
}

impl From<&GuestSpec> for VmSize {
    fn from(g: &GuestSpec) -> Self {
        Self {
            name: guest::size_name(g),
            memory_mb: g.memory_mb,
            cpu_cores: g.cpus as f32,
        }
    }
}

/// Applies mutations to machines under per-machine leases.
pub struct LeaseCoordinator {
    api: Arc<dyn MachineApi>,
    lease_ttl: Duration,
}

impl LeaseCoordinator {
    pub fn new(api: Arc<dyn MachineApi>, lease_ttl: Duration) -> Self {
        Self { api, lease_ttl }
    }

    pub fn from_settings(api: Arc<dyn MachineApi>, settings: &Settings) -> Self {
        Self::new(api, settings.lease_ttl())
    }

    /// Update each machine in order; returns the updated machines.
    pub async fn update_machines(
        &self,
        machines: Vec<Machine>,
        mutation: &MachineMutation,
    ) -> Result<Vec<Machine>, LeaseError> {
        mutation.validate()?;
        let mut updated = Vec::with_capacity(machines.len());
        for machine in machines {
            updated.push(self.update_machine(machine, mutation).await?);
        }
        tracing::info!(machines = updated.len(), "machines updated");
        Ok(updated)
    }

    /// Lease, mutate, and release a single machine.
    pub async fn update_machine(
        &self,
        machine: Machine,
        mutation: &MachineMutation,
    ) -> Result<Machine, LeaseError> {
        let mut leased =
            LeasedMachine::acquire(Arc::clone(&self.api), machine, self.lease_ttl).await?;
        let result = Self::apply(&mut leased, mutation).await;
        let machine = leased.release().await;
        result.map(|()| machine)
    }

    /// Active machines belonging to `group`; none at all is an error.
    pub async fn machines_in_group(&self, group: &str) -> Result<Vec<Machine>, LeaseError> {
        let machines: Vec<Machine> = self
            .api
            .list_active()
            .await
            .map_err(LeaseError::List)?
            .into_iter()
            .filter(|m| m.process_group() == group)
            .collect();
        if machines.is_empty() {
            return Err(LeaseError::NoMachinesInGroup(group.to_string()));
        }
        Ok(machines)
    }

    /// Resize every machine of a process group.
    ///
    /// Without an explicit `group` the app must have a single process group.
    /// The size name is checked before any remote call.
    pub async fn scale_vm(
        &self,
        config: &AppConfig,
        group: Option<&str>,
        mutation: &MachineMutation,
    ) -> Result<VmSize, LeaseError> {
        mutation.validate()?;

        let group = match group.filter(|g| !g.is_empty()) {
            Some(group) => group,
            None => config
                .default_process_name()
                .ok_or_else(|| LeaseError::AmbiguousProcessGroup(config.processes.clone()))?,
        };

        let machines = self.machines_in_group(group).await?;
        tracing::info!(group, machines = machines.len(), "scaling machines");
        let updated = self.update_machines(machines, mutation).await?;

        let first = updated
            .first()
            .ok_or_else(|| LeaseError::NoMachinesInGroup(group.to_string()))?;
        Ok(VmSize::from(&first.config.guest))
    }

    async fn apply(
        leased: &mut LeasedMachine,
        mutation: &MachineMutation,
    ) -> Result<(), LeaseError> {
        let id = leased.machine().id.clone();
        let mut input = LaunchInput::from_machine(leased.machine());
        mutation.apply(&mut input.config.guest)?;

        let err = match leased.update(&input).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        let fixed = match &err {
            MachineApiError::InvalidConfig(reason) => reason.attempt_fix(&input.config.guest),
            _ => None,
        };
        let Some(fixed_guest) = fixed else {
            return Err(LeaseError::Update { id, source: err });
        };

        tracing::info!(
            machine = %id,
            reason = %err,
            memory_mb = fixed_guest.memory_mb,
            "retrying update with corrected guest"
        );
        input.config.guest = fixed_guest;
        match leased.update(&input).await {
            Ok(()) => Ok(()),
            Err(retry_err) => {
                tracing::debug!(machine = %id, error = %retry_err, "retry failed");
                Err(LeaseError::Update { id, source: err })
            }
        }
    }
}
