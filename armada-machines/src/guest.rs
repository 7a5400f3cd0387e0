//! Named guest sizes and memory constraints.

use thiserror::Error;

use armada_core::{CpuKind, GuestSpec};

use crate::error::LeaseError;

/// A named guest size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizePreset {
    pub name: &'static str,
    pub cpu_kind: CpuKind,
    pub cpus: u32,
    pub memory_mb: u32,
}

const fn preset(name: &'static str, cpu_kind: CpuKind, cpus: u32, memory_mb: u32) -> SizePreset {
    SizePreset {
        name,
        cpu_kind,
        cpus,
        memory_mb,
    }
}

pub const PRESETS: &[SizePreset] = &[
    preset("shared-cpu-1x", CpuKind::Shared, 1, 256),
    preset("shared-cpu-2x", CpuKind::Shared, 2, 512),
    preset("shared-cpu-4x", CpuKind::Shared, 4, 1024),
    preset("shared-cpu-8x", CpuKind::Shared, 8, 2048),
    preset("performance-1x", CpuKind::Performance, 1, 2048),
    preset("performance-2x", CpuKind::Performance, 2, 4096),
    preset("performance-4x", CpuKind::Performance, 4, 8192),
    preset("performance-8x", CpuKind::Performance, 8, 16384),
    preset("performance-16x", CpuKind::Performance, 16, 32768),
];

pub fn find_preset(name: &str) -> Option<&'static SizePreset> {
    PRESETS.iter().find(|p| p.name == name)
}

/// Reset `guest` to the named preset.
pub fn apply_size(guest: &mut GuestSpec, name: &str) -> Result<(), LeaseError> {
    let preset = find_preset(name).ok_or_else(|| LeaseError::UnknownSize(name.to_string()))?;
    guest.cpu_kind = preset.cpu_kind;
    guest.cpus = preset.cpus;
    guest.memory_mb = preset.memory_mb;
    Ok(())
}

/// Preset-style name for the guest's CPU shape, e.g. `shared-cpu-2x`.
pub fn size_name(guest: &GuestSpec) -> String {
    match guest.cpu_kind {
        CpuKind::Shared => format!("shared-cpu-{}x", guest.cpus),
        CpuKind::Performance => format!("performance-{}x", guest.cpus),
    }
}

// ---------------------------------------------------------------------------
// Invalid configuration
// ---------------------------------------------------------------------------

/// Why the machine API rejected a guest configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidConfig {
    #[error("memory below minimum of {min_mb} MB")]
    MemoryBelowMinimum { min_mb: u32 },

    #[error("memory above maximum of {max_mb} MB")]
    MemoryAboveMaximum { max_mb: u32 },

    #[error("memory must be a multiple of {step_mb} MB")]
    MemoryNotMultipleOf { step_mb: u32 },

    #[error("{0}")]
    Other(String),
}

impl InvalidConfig {
    /// Corrected guest for this rejection, or `None` when no fix applies.
    pub fn attempt_fix(&self, guest: &GuestSpec) -> Option<GuestSpec> {
        let memory_mb = match *self {
            InvalidConfig::MemoryBelowMinimum { min_mb } => min_mb,
            InvalidConfig::MemoryAboveMaximum { max_mb } => max_mb,
            InvalidConfig::MemoryNotMultipleOf { step_mb } if step_mb > 0 => {
                guest.memory_mb.div_ceil(step_mb) * step_mb
            }
            _ => return None,
        };
        if memory_mb == guest.memory_mb {
            return None;
        }
        Some(GuestSpec {
            memory_mb,
            ..guest.clone()
        })
    }
}
