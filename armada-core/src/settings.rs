//! Orchestrator settings.
//!
//! # Storage layout
//!
//! ```text
//! ~/.armada/
//!   settings.yaml   (optional: mode 0600; defaults apply when absent)
//! ```
//!
//! # API pattern
//!
//! Every function touching the filesystem has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Hostname of the object-storage service; buckets are addressed as
/// `<bucket>.<storage_hostname>`.
pub const DEFAULT_STORAGE_HOSTNAME: &str = "fly.storage.tigris.dev";

/// Authenticating forward proxy that swaps sealed credentials for real ones.
pub const DEFAULT_PROXY_URL: &str = "https://tokenizer.fly.io";

/// Top-level prefix under which every app's version directories live.
pub const DEFAULT_STORAGE_ROOT: &str = "fly-statics";

/// Managed-resource provider that backs static buckets.
pub const DEFAULT_PROVIDER: &str = "tigris";

/// Process-wide seal key (hex, 32 bytes) shared with the proxy.
pub const DEFAULT_SEAL_KEY: &str =
    "3afdb665d93f741adc98a6cfecb36f1e02403a095e8efa921fd2321857011f42";

/// Tunables for provisioning, synchronization, retention and leasing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage_hostname: String,
    pub proxy_url: String,
    pub storage_root: String,
    pub provider: String,
    /// Number of most recent valid version directories kept by retention.
    pub keep_versions: usize,
    /// Size of the upload worker pool.
    pub upload_workers: usize,
    /// Timeout for the best-effort cleanup after a failed push.
    pub cleanup_timeout_secs: u64,
    pub lease_ttl_secs: u64,
    pub seal_key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_hostname: DEFAULT_STORAGE_HOSTNAME.to_string(),
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            storage_root: DEFAULT_STORAGE_ROOT.to_string(),
            provider: DEFAULT_PROVIDER.to_string(),
            keep_versions: 3,
            upload_workers: 5,
            cleanup_timeout_secs: 5,
            lease_ttl_secs: 30,
            seal_key: DEFAULT_SEAL_KEY.to_string(),
        }
    }
}

impl Settings {
    /// Plain-HTTP endpoint of the storage service. Requests travel to the
    /// proxy over HTTPS and the proxy forwards upstream over HTTPS.
    pub fn storage_endpoint(&self) -> String {
        format!("http://{}", self.storage_hostname)
    }

    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_secs(self.cleanup_timeout_secs)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    /// Decode the hex seal key into raw key bytes.
    pub fn seal_key_bytes(&self) -> Result<[u8; 32], ConfigError> {
        let raw = hex::decode(self.seal_key.trim()).map_err(|e| ConfigError::InvalidSetting {
            field: "seal_key",
            reason: e.to_string(),
        })?;
        raw.try_into().map_err(|raw: Vec<u8>| ConfigError::InvalidSetting {
            field: "seal_key",
            reason: format!("expected 32 bytes, got {}", raw.len()),
        })
    }

    /// Reject settings the orchestrator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upload_workers == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "upload_workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.keep_versions == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "keep_versions",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.cleanup_timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "cleanup_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.storage_hostname.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                field: "storage_hostname",
                reason: "must not be empty".to_string(),
            });
        }
        if self.storage_root.trim_matches('/').is_empty() {
            return Err(ConfigError::InvalidSetting {
                field: "storage_root",
                reason: "must not be empty".to_string(),
            });
        }
        self.seal_key_bytes()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.armada/settings.yaml`: pure, no I/O.
pub fn settings_path_at(home: &Path) -> PathBuf {
    home.join(".armada").join("settings.yaml")
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load settings from `<home>/.armada/settings.yaml`.
///
/// Missing file → defaults. Malformed YAML → `ConfigError::Parse` with path.
/// Loaded settings are validated before being returned.
pub fn load_at(home: &Path) -> Result<Settings, ConfigError> {
    let path = settings_path_at(home);
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no settings file, using defaults");
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    let settings: Settings =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?;
    settings.validate()?;
    Ok(settings)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Settings, ConfigError> {
    load_at(&home()?)
}

/// Atomically save settings to `<home>/.armada/settings.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, settings: &Settings) -> Result<(), ConfigError> {
    let path = settings_path_at(home);
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            set_dir_permissions(dir)?;
        }
    }
    let tmp_path = path.with_file_name("settings.yaml.tmp");

    let yaml = serde_yaml::to_string(settings)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(settings: &Settings) -> Result<(), ConfigError> {
    save_at(&home()?, settings)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
