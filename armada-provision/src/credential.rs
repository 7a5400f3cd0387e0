//! Capability-scoped credential sealing.
//!
//! A sealed credential is an opaque envelope the authenticating proxy opens
//! to sign storage requests on our behalf. It binds the raw processor secrets
//! to an [`AccessScope`] that allows exactly one action (`write`) against
//! exactly one host (`<bucket>.<storage-hostname>`).
//!
//! ## Envelope format
//!
//! ```text
//! base64url( version:u8 | nonce:[u8; 12] | AES-256-GCM(payload JSON) )
//! ```
//!
//! The nonce is the truncated HMAC-SHA256 of the payload under the seal key,
//! so sealing the same payload with the same key always yields the same value.

use std::collections::BTreeMap;
use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use armada_core::{AppIdentity, OrgIdentity, Settings};

use crate::error::CredentialError;

/// Current envelope version.
pub const SEAL_VERSION: u8 = 1;

const NONCE_LEN: usize = 12;

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Storage action a credential may authorize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Write,
    Delete,
}

/// What a sealed credential is allowed to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessScope {
    pub action: Action,
    pub org_id: u64,
    pub app_id: u64,
    pub allowed_hosts: Vec<String>,
}

impl AccessScope {
    /// Write-only scope for a single bucket.
    pub fn for_bucket(org_id: u64, app_id: u64, bucket: &str, storage_hostname: &str) -> Self {
        Self {
            action: Action::Write,
            org_id,
            app_id,
            allowed_hosts: vec![format!("{bucket}.{storage_hostname}")],
        }
    }

    /// Whether a request performing `action` against `host` is in scope.
    ///
    /// A trailing `:port` on `host` is ignored; host comparison is
    /// case-insensitive.
    pub fn permits(&self, action: Action, host: &str) -> bool {
        if action != self.action {
            return false;
        }
        let host = host.rsplit_once(':').map_or(host, |(name, _)| name);
        self.allowed_hosts
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(host))
    }
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// Raw S3-style key pair returned when a bucket is provisioned.
///
/// Zeroized on drop; `Debug` never prints the values.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ProcessorSecrets {
    access_key_id: String,
    secret_access_key: String,
}

impl ProcessorSecrets {
    pub const ACCESS_KEY_VAR: &'static str = "AWS_ACCESS_KEY_ID";
    pub const SECRET_KEY_VAR: &'static str = "AWS_SECRET_ACCESS_KEY";

    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Result<Self, CredentialError> {
        let secrets = Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        };
        if secrets.access_key_id.trim().is_empty() {
            return Err(CredentialError::MissingSecret(Self::ACCESS_KEY_VAR));
        }
        if secrets.secret_access_key.trim().is_empty() {
            return Err(CredentialError::MissingSecret(Self::SECRET_KEY_VAR));
        }
        Ok(secrets)
    }

    /// Extract the key pair from a provisioned resource's environment.
    pub fn from_environment(env: &BTreeMap<String, String>) -> Result<Self, CredentialError> {
        let access = env
            .get(Self::ACCESS_KEY_VAR)
            .ok_or(CredentialError::MissingSecret(Self::ACCESS_KEY_VAR))?;
        let secret = env
            .get(Self::SECRET_KEY_VAR)
            .ok_or(CredentialError::MissingSecret(Self::SECRET_KEY_VAR))?;
        Self::new(access.as_str(), secret.as_str())
    }
}

impl fmt::Debug for ProcessorSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorSecrets")
            .field("access_key_id", &"<redacted>")
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Sealed credential
// ---------------------------------------------------------------------------

/// Opaque sealed credential string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SealedCredential(String);

impl SealedCredential {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode only the scope descriptor. Processor secrets are discarded.
    pub fn inspect_scope(&self, seal_key: &[u8; 32]) -> Result<AccessScope, CredentialError> {
        let raw = URL_SAFE_NO_PAD.decode(&self.0)?;
        let (&version, rest) = raw
            .split_first()
            .ok_or_else(|| CredentialError::Malformed("empty envelope".to_string()))?;
        if version != SEAL_VERSION {
            return Err(CredentialError::UnsupportedVersion(version));
        }
        if rest.len() <= NONCE_LEN {
            return Err(CredentialError::Malformed(format!(
                "envelope too short: {} bytes",
                raw.len()
            )));
        }
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new_from_slice(seal_key)
            .map_err(|e| CredentialError::Malformed(e.to_string()))?;
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(nonce), ciphertext)
                .map_err(|_| CredentialError::Malformed("authentication failed".to_string()))?,
        );
        let view: ScopeView = serde_json::from_slice(&plaintext)?;
        Ok(view.scope)
    }
}

impl From<String> for SealedCredential {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Serialize)]
struct SealedPayload<'a> {
    scope: &'a AccessScope,
    processor: Sigv4Processor<'a>,
}

#[derive(Serialize)]
struct Sigv4Processor<'a> {
    access_key: &'a str,
    secret_key: &'a str,
}

#[derive(Deserialize)]
struct ScopeView {
    scope: AccessScope,
}

// ---------------------------------------------------------------------------
// Issuer
// ---------------------------------------------------------------------------

/// Mints sealed, bucket-scoped write credentials.
pub struct CredentialIssuer {
    seal_key: Zeroizing<[u8; 32]>,
    storage_hostname: String,
}

impl CredentialIssuer {
    pub fn new(seal_key: [u8; 32], storage_hostname: impl Into<String>) -> Self {
        Self {
            seal_key: Zeroizing::new(seal_key),
            storage_hostname: storage_hostname.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, CredentialError> {
        Ok(Self::new(
            settings.seal_key_bytes()?,
            settings.storage_hostname.clone(),
        ))
    }

    /// Seal `secrets` behind a write-only scope for `bucket`.
    pub fn issue(
        &self,
        org: &OrgIdentity,
        app: &AppIdentity,
        bucket: &str,
        secrets: &ProcessorSecrets,
    ) -> Result<SealedCredential, CredentialError> {
        let org_id: u64 =
            org.internal_numeric_id
                .parse()
                .map_err(|source| CredentialError::InvalidOrgId {
                    slug: org.slug.clone(),
                    source,
                })?;

        let scope = AccessScope::for_bucket(
            org_id,
            app.internal_numeric_id,
            bucket,
            &self.storage_hostname,
        );
        let sealed = self.seal(&scope, secrets)?;
        tracing::debug!(bucket, org = %org.slug, app = %app.name, "issued sealed credential");
        Ok(sealed)
    }

    fn seal(
        &self,
        scope: &AccessScope,
        secrets: &ProcessorSecrets,
    ) -> Result<SealedCredential, CredentialError> {
        let payload = SealedPayload {
            scope,
            processor: Sigv4Processor {
                access_key: &secrets.access_key_id,
                secret_key: &secrets.secret_access_key,
            },
        };
        let plaintext = Zeroizing::new(serde_json::to_vec(&payload)?);

        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.seal_key[..])
            .map_err(|e| CredentialError::Seal(e.to_string()))?;
        mac.update(&plaintext);
        let tag = mac.finalize().into_bytes();
        let nonce_bytes = &tag[..NONCE_LEN];

        let cipher = Aes256Gcm::new_from_slice(&self.seal_key[..])
            .map_err(|e| CredentialError::Seal(e.to_string()))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(nonce_bytes), plaintext.as_slice())
            .map_err(|_| CredentialError::Seal("AES-GCM encryption failed".to_string()))?;

        let mut envelope = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        envelope.push(SEAL_VERSION);
        envelope.extend_from_slice(nonce_bytes);
        envelope.extend_from_slice(&ciphertext);
        Ok(SealedCredential(URL_SAFE_NO_PAD.encode(envelope)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
