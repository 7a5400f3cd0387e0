//! Armada core library: domain types, orchestrator settings, errors.
//!
//! - [`types`]: machines, leases, static asset specs, app configuration
//! - [`settings`]: load / save / validate orchestrator settings
//! - [`error`]: [`ConfigError`]
//! - [`telemetry`]: tracing subscriber bootstrap

pub mod error;
pub mod settings;
pub mod telemetry;
pub mod types;

pub use error::ConfigError;
pub use settings::Settings;
pub use types::{
    AppConfig, AppIdentity, AppName, CpuKind, GuestSpec, Lease, Machine, MachineConfig,
    MachineId, OrgIdentity, StaticAssetSpec,
};
