//! Trust-level derivation and signature policy.
//!
//! The engine owns *when and how* verification must succeed. Structural
//! checks (signature shape, scheme, key id, payload length) live here;
//! byte-level cryptography is delegated to an injected [`SignatureVerifier`]
//! so it stays swappable and independently auditable.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::manifest::{PluginManifest, SignatureInfo};
use crate::registry::Plugin;

/// Decoded signature payloads shorter than this are structurally invalid.
pub const MIN_SIGNATURE_BYTES: usize = 8;

/// Ordered trust classification governing install eligibility.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Untrusted = 1,
    Community = 2,
    Verified = 3,
    Builtin = 4,
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrustLevel::Untrusted => "untrusted",
            TrustLevel::Community => "community",
            TrustLevel::Verified => "verified",
            TrustLevel::Builtin => "builtin",
        };
        f.write_str(name)
    }
}

/// Install eligibility policy.
///
/// A non-empty `allowed_levels` set takes precedence over `min_level`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustPolicy {
    pub min_level: TrustLevel,
    #[serde(default)]
    pub allowed_levels: Vec<TrustLevel>,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            min_level: TrustLevel::Community,
            allowed_levels: Vec::new(),
        }
    }
}

impl TrustPolicy {
    /// Requires externally verified signatures (or builtins).
    pub fn strict() -> Self {
        Self {
            min_level: TrustLevel::Verified,
            allowed_levels: Vec::new(),
        }
    }

    pub fn with_allowed_levels(levels: Vec<TrustLevel>) -> Self {
        Self {
            min_level: TrustLevel::Untrusted,
            allowed_levels: levels,
        }
    }
}

/// Supported signature schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureScheme {
    Ssh,
    Gpg,
    Sigstore,
}

impl FromStr for SignatureScheme {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ssh" => Ok(SignatureScheme::Ssh),
            "gpg" => Ok(SignatureScheme::Gpg),
            "sigstore" => Ok(SignatureScheme::Sigstore),
            other => Err(StoreError::SignatureStructure {
                reason: format!("unsupported signature type '{}'", other),
            }),
        }
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignatureScheme::Ssh => "ssh",
            SignatureScheme::Gpg => "gpg",
            SignatureScheme::Sigstore => "sigstore",
        };
        f.write_str(name)
    }
}

/// Externally supplied verification material. Every field is optional;
/// missing material for a scheme fails closed at verification time.
#[derive(Debug, Clone, Default)]
pub struct VerificationConfig {
    pub ssh_allowed_signers: Option<PathBuf>,
    pub gpg_keyring: Option<PathBuf>,
    pub sigstore_roots: Option<PathBuf>,
    /// Key ids trusted outright, bypassing cryptographic verification.
    pub trusted_key_ids: Vec<String>,
}

impl VerificationConfig {
    fn material_for(&self, scheme: SignatureScheme) -> Option<&PathBuf> {
        match scheme {
            SignatureScheme::Ssh => self.ssh_allowed_signers.as_ref(),
            SignatureScheme::Gpg => self.gpg_keyring.as_ref(),
            SignatureScheme::Sigstore => self.sigstore_roots.as_ref(),
        }
    }
}

/// Byte-level signature verification, injected by the host.
pub trait SignatureVerifier: Send + Sync {
    fn verify(
        &self,
        scheme: SignatureScheme,
        key_id: &str,
        payload: &[u8],
        signature: &[u8],
        config: &VerificationConfig,
    ) -> Result<()>;
}

/// Validate the shape of a manifest's signature block: supported scheme,
/// non-empty key id, and base64 data decoding to at least
/// [`MIN_SIGNATURE_BYTES`] bytes. Never touches the network or a keyring.
pub fn verify_signature_structure(manifest: &PluginManifest) -> Result<()> {
    let signature = manifest
        .signature
        .as_ref()
        .ok_or_else(|| StoreError::SignatureStructure {
            reason: "manifest carries no signature".to_string(),
        })?;
    decode_signature(signature).map(|_| ())
}

fn decode_signature(signature: &SignatureInfo) -> Result<Vec<u8>> {
    signature.sig_type.parse::<SignatureScheme>()?;
    if signature.key_id.is_empty() {
        return Err(StoreError::SignatureStructure {
            reason: "signature keyId is empty".to_string(),
        });
    }
    if signature.data.is_empty() {
        return Err(StoreError::SignatureStructure {
            reason: "signature data is empty".to_string(),
        });
    }
    let decoded = BASE64
        .decode(signature.data.as_bytes())
        .map_err(|e| StoreError::SignatureStructure {
            reason: format!("signature data is not valid base64: {}", e),
        })?;
    if decoded.len() < MIN_SIGNATURE_BYTES {
        return Err(StoreError::SignatureStructure {
            reason: format!(
                "decoded signature is {} bytes, minimum is {}",
                decoded.len(),
                MIN_SIGNATURE_BYTES
            ),
        });
    }
    Ok(decoded)
}

/// Derives trust levels and enforces install policies.
pub struct TrustEngine {
    config: VerificationConfig,
    verifier: Option<Arc<dyn SignatureVerifier>>,
}

impl TrustEngine {
    pub fn new(config: VerificationConfig) -> Self {
        Self {
            config,
            verifier: None,
        }
    }

    pub fn with_verifier(config: VerificationConfig, verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self {
            config,
            verifier: Some(verifier),
        }
    }

    pub fn config(&self) -> &VerificationConfig {
        &self.config
    }

    /// Derive a plugin's trust level from structure alone.
    ///
    /// Builtins override everything. A structurally valid signature earns
    /// Community; promotion to Verified happens only through
    /// [`TrustEngine::verified_trust_level`] once the external verifier has
    /// confirmed authenticity. A WASM checksum or any preset/capability-pack
    /// content also earns Community.
    pub fn determine_trust_level(&self, plugin: Option<&Plugin>) -> TrustLevel {
        let plugin = match plugin {
            Some(plugin) => plugin,
            None => return TrustLevel::Untrusted,
        };
        if plugin.is_builtin() {
            return TrustLevel::Builtin;
        }
        let manifest = &plugin.manifest;
        if manifest.signature.is_some() && verify_signature_structure(manifest).is_ok() {
            return TrustLevel::Community;
        }
        if manifest
            .wasm
            .as_ref()
            .is_some_and(|w| !w.checksum.is_empty())
        {
            return TrustLevel::Community;
        }
        if !manifest.provides.presets.is_empty() || !manifest.provides.capability_packs.is_empty()
        {
            return TrustLevel::Community;
        }
        TrustLevel::Untrusted
    }

    /// Derive a trust level, promoting Community to Verified when the
    /// injected verifier confirms the signature over `payload`.
    pub fn verified_trust_level(&self, plugin: Option<&Plugin>, payload: &[u8]) -> TrustLevel {
        let Some(plugin) = plugin else {
            return TrustLevel::Untrusted;
        };
        let level = self.determine_trust_level(Some(plugin));
        if level != TrustLevel::Community {
            return level;
        }
        if plugin.manifest.signature.is_some()
            && self.verify_signature(&plugin.manifest, payload).is_ok()
        {
            debug!(plugin = plugin.name(), "signature verified, promoting to verified");
            return TrustLevel::Verified;
        }
        level
    }

    /// Verify a manifest signature against the verification config.
    ///
    /// Structure is checked first. A key id on the explicit trusted
    /// allow-list bypasses cryptography entirely. Otherwise the injected
    /// per-scheme verifier decides; a missing verifier or missing scheme
    /// material fails closed.
    pub fn verify_signature(&self, manifest: &PluginManifest, payload: &[u8]) -> Result<()> {
        let signature = manifest
            .signature
            .as_ref()
            .ok_or_else(|| StoreError::SignatureStructure {
                reason: "manifest carries no signature".to_string(),
            })?;
        let decoded = decode_signature(signature)?;
        let scheme: SignatureScheme = signature.sig_type.parse()?;

        if self.config.trusted_key_ids.iter().any(|k| k == &signature.key_id) {
            debug!(key_id = %signature.key_id, "key id on trusted allow-list");
            return Ok(());
        }

        if self.config.material_for(scheme).is_none() {
            return Err(StoreError::SignatureVerification {
                reason: format!("no verification material configured for {} signatures", scheme),
            });
        }

        let verifier = self
            .verifier
            .as_ref()
            .ok_or_else(|| StoreError::SignatureVerification {
                reason: "no signature verifier configured".to_string(),
            })?;

        verifier.verify(scheme, &signature.key_id, payload, &decoded, &self.config)
    }

    /// Enforce a trust policy against a plugin's derived level.
    pub fn enforce_trust_level(&self, plugin: Option<&Plugin>, policy: &TrustPolicy) -> Result<()> {
        let plugin = plugin.ok_or_else(|| StoreError::InvalidArgument {
            what: "no plugin supplied for trust enforcement".to_string(),
        })?;
        let actual = self.determine_trust_level(Some(plugin));

        if !policy.allowed_levels.is_empty() {
            if !policy.allowed_levels.contains(&actual) {
                let required = policy
                    .allowed_levels
                    .iter()
                    .copied()
                    .min()
                    .unwrap_or(policy.min_level);
                return Err(StoreError::TrustLevelInsufficient {
                    actual,
                    required,
                    reason: format!(
                        "level '{}' is not in the policy's allowed set",
                        actual
                    ),
                });
            }
            return Ok(());
        }

        if actual < policy.min_level {
            return Err(StoreError::TrustLevelInsufficient {
                actual,
                required: policy.min_level,
                reason: format!(
                    "plugin '{}' derived level '{}' is below the policy minimum",
                    plugin.name(),
                    actual
                ),
            });
        }
        Ok(())
    }
}
