//! Domain types shared by the provisioning, statics and machine crates.
//!
//! All types are serializable/deserializable via serde + serde_yaml so that a
//! validated deployment configuration can be handed over as a YAML snapshot.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Process group assumed for machines that carry no group metadata.
pub const DEFAULT_PROCESS_GROUP: &str = "app";

/// Machine metadata key naming the process group a machine belongs to.
pub const PROCESS_GROUP_METADATA_KEY: &str = "fly_process_group";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed application name (also the storage sub-root).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppName(pub String);

impl fmt::Display for AppName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for AppName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AppName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A strongly-typed machine identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MachineId(pub String);

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for MachineId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MachineId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// The application a deployment belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdentity {
    /// Opaque control-plane id; matched against bucket metadata.
    pub id: String,
    pub name: AppName,
    /// Numeric id bound into credential scopes.
    pub internal_numeric_id: u64,
}

/// The organization that owns the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgIdentity {
    pub slug: String,
    /// Numeric id as reported by the control plane. Kept as a string because
    /// the API reports it that way; parsed when a credential is minted.
    pub internal_numeric_id: String,
}

// ---------------------------------------------------------------------------
// Static assets
// ---------------------------------------------------------------------------

/// A declared local directory served as static content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StaticAssetSpec {
    /// Relative paths are synchronized to object storage; absolute paths are
    /// baked into the deployed image.
    pub guest_path: String,
    pub url_prefix: String,
    /// Externally bound bucket. When set the user manages the bucket directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_document: Option<String>,
}

impl StaticAssetSpec {
    /// Whether this static should be pushed to the managed bucket.
    pub fn is_sync_candidate(&self) -> bool {
        if self.bucket.as_deref().is_some_and(|b| !b.is_empty()) {
            return false;
        }
        if self.guest_path.is_empty() {
            return false;
        }
        !self.guest_path.starts_with('/')
    }
}

/// The already-validated deployment configuration consumed by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub app_name: AppName,
    #[serde(default)]
    pub primary_region: String,
    #[serde(default)]
    pub statics: Vec<StaticAssetSpec>,
    /// Declared process group names. Empty means the single default group.
    #[serde(default)]
    pub processes: Vec<String>,
}

impl AppConfig {
    /// Load a configuration snapshot from a YAML file.
    ///
    /// Returns `ConfigError::Parse` (with path + line context) if malformed.
    pub fn load_yaml_at(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Name of the only process group, when the app declares at most one.
    pub fn default_process_name(&self) -> Option<&str> {
        match self.processes.as_slice() {
            [] => Some(DEFAULT_PROCESS_GROUP),
            [only] => Some(only.as_str()),
            _ => None,
        }
    }

    /// Whether any static in this configuration is pushed to the managed bucket.
    pub fn has_sync_candidates(&self) -> bool {
        self.statics.iter().any(StaticAssetSpec::is_sync_candidate)
    }
}

// ---------------------------------------------------------------------------
// Machines
// ---------------------------------------------------------------------------

/// CPU class of a machine guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CpuKind {
    #[default]
    Shared,
    Performance,
}

impl fmt::Display for CpuKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuKind::Shared => write!(f, "shared"),
            CpuKind::Performance => write!(f, "performance"),
        }
    }
}

/// Compute resources requested for a machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestSpec {
    #[serde(default)]
    pub cpu_kind: CpuKind,
    pub cpus: u32,
    pub memory_mb: u32,
}

impl Default for GuestSpec {
    fn default() -> Self {
        Self {
            cpu_kind: CpuKind::Shared,
            cpus: 1,
            memory_mb: 256,
        }
    }
}

/// Configuration applied to a machine on update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MachineConfig {
    #[serde(default)]
    pub guest: GuestSpec,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// A remote compute instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub id: MachineId,
    pub name: String,
    pub region: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub config: MachineConfig,
}

impl Machine {
    pub fn process_group(&self) -> &str {
        self.config
            .metadata
            .get(PROCESS_GROUP_METADATA_KEY)
            .map(String::as_str)
            .unwrap_or(DEFAULT_PROCESS_GROUP)
    }
}

/// Exclusive right to mutate one machine until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Token presented on update and release.
    pub nonce: String,
    pub owner: String,
    pub expires_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
