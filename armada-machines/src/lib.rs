//! # armada-machines
//!
//! Lease-guarded machine updates.
//!
//! [`LeaseCoordinator::update_machines`] acquires each machine's lease,
//! applies a [`MachineMutation`], retries once after a fixable
//! [`InvalidConfig`] rejection, and always releases the lease.

pub mod coordinator;
pub mod error;
pub mod guest;
pub mod lease;

pub use coordinator::{LeaseCoordinator, MachineMutation, VmSize};
pub use error::{LeaseError, MachineApiError};
pub use guest::{InvalidConfig, SizePreset};
pub use lease::{LaunchInput, LeasedMachine, MachineApi};
