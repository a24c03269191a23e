//! Plugin manifest model and validation.
//!
//! A manifest is the declarative descriptor of a plugin: identity, version,
//! what it provides, what it requires, and (for provider plugins) the WASM
//! sandbox configuration. Manifests are YAML on disk and validated before
//! anything else in the install pipeline looks at them.

use std::sync::OnceLock;

use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};

/// The single manifest schema version this engine understands.
pub const API_VERSION: &str = "devrig.dev/v1";

/// Manifests larger than this are rejected before parsing.
pub const MAX_MANIFEST_SIZE: usize = 256 * 1024;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_-]{1,63}$").expect("static pattern compiles")
    })
}

/// Kind of plugin a manifest describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    /// Ships configuration presets and capability packs.
    Config,
    /// Ships a sandboxed WASM provider implementation.
    Provider,
}

/// A provider implementation exposed by a plugin.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpec {
    pub name: String,
    pub config_key: String,
    #[serde(default)]
    pub description: String,
}

/// Everything a plugin contributes to the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    #[serde(default)]
    pub providers: Vec<ProviderSpec>,
    #[serde(default)]
    pub presets: Vec<String>,
    #[serde(default)]
    pub capability_packs: Vec<String>,
}

impl Capabilities {
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty() && self.presets.is_empty() && self.capability_packs.is_empty()
    }
}

/// A dependency on another plugin, with an optional version constraint.
///
/// The constraint grammar is an operator (`=`, `>=`, `<=`, `>`, `<`, `^`,
/// `~`) followed by a semver triple, a bare triple (exact match), or the
/// empty string (any version).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// A sandbox permission requested by a WASM provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WasmCapability {
    pub name: String,
    #[serde(default)]
    pub justification: String,
    #[serde(default)]
    pub optional: bool,
}

/// WASM module configuration for provider plugins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WasmConfig {
    pub module: String,
    pub checksum: String,
    #[serde(default)]
    pub capabilities: Vec<WasmCapability>,
}

/// Structural signature metadata attached to a manifest.
///
/// The engine validates shape only; byte-level cryptography is delegated to
/// an injected verifier (see [`crate::trust`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    #[serde(rename = "type")]
    pub sig_type: String,
    pub key_id: String,
    pub data: String,
}

/// Canonical plugin descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    pub api_version: String,
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub provides: Capabilities,
    #[serde(default)]
    pub requires: Vec<Dependency>,
    #[serde(default)]
    pub min_host_version: String,
    #[serde(default)]
    pub wasm: Option<WasmConfig>,
    #[serde(default)]
    pub signature: Option<SignatureInfo>,
}

impl PluginManifest {
    /// Create a minimal manifest with the current API version. Callers fill
    /// in `provides`, `requires`, `wasm` and `signature` as needed.
    pub fn new(name: impl Into<String>, version: impl Into<String>, plugin_type: PluginType) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            name: name.into(),
            version: version.into(),
            plugin_type,
            description: String::new(),
            author: String::new(),
            license: String::new(),
            homepage: String::new(),
            repository: String::new(),
            keywords: Vec::new(),
            provides: Capabilities::default(),
            requires: Vec::new(),
            min_host_version: String::new(),
            wasm: None,
            signature: None,
        }
    }

    /// Parse a manifest from raw YAML bytes, enforcing the size ceiling
    /// before the parser ever sees the input, then running full validation.
    pub fn from_yaml(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_MANIFEST_SIZE {
            return Err(StoreError::ManifestTooLarge {
                size: bytes.len(),
                limit: MAX_MANIFEST_SIZE,
            });
        }
        let manifest: PluginManifest = serde_yaml::from_slice(bytes)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Serialize back to YAML, for tooling that rewrites manifests.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the manifest shape.
    ///
    /// Check order: api version, name, version, type-specific requirements,
    /// then per-item checks on providers and WASM capabilities. All items in
    /// a group are scanned but the first failing group wins; item errors
    /// name the failing index.
    pub fn validate(&self) -> Result<()> {
        if self.api_version != API_VERSION {
            return Err(self.invalid(format!(
                "unsupported apiVersion '{}', expected '{}'",
                self.api_version, API_VERSION
            )));
        }

        if !name_pattern().is_match(&self.name) {
            return Err(self.invalid(format!(
                "name '{}' must start with a letter and contain 2-64 letters, digits, '_' or '-'",
                self.name
            )));
        }

        validate_semver(&self.version)?;

        match self.plugin_type {
            PluginType::Provider => {
                let wasm = self.wasm.as_ref().ok_or_else(|| {
                    self.invalid("provider plugins require a wasm block with module and checksum")
                })?;
                if wasm.module.is_empty() {
                    return Err(self.invalid("wasm.module must not be empty"));
                }
                if !is_hex_digest(&wasm.checksum) {
                    return Err(StoreError::ChecksumFormat {
                        value: wasm.checksum.clone(),
                    });
                }
            }
            PluginType::Config => {
                if self.provides.presets.is_empty() && self.provides.capability_packs.is_empty() {
                    return Err(self.invalid(
                        "config plugins must provide at least one preset or capability pack",
                    ));
                }
            }
        }

        for (i, provider) in self.provides.providers.iter().enumerate() {
            if provider.name.is_empty() {
                return Err(self.invalid(format!("provider {} has an empty name", i)));
            }
            if provider.config_key.is_empty() {
                return Err(self.invalid(format!(
                    "provider {} ('{}') has an empty configKey",
                    i, provider.name
                )));
            }
        }

        if let Some(wasm) = &self.wasm {
            for (i, cap) in wasm.capabilities.iter().enumerate() {
                if cap.name.is_empty() {
                    return Err(self.invalid(format!("wasm capability {} has an empty name", i)));
                }
            }
        }

        Ok(())
    }

    fn invalid(&self, reason: impl Into<String>) -> StoreError {
        StoreError::InvalidManifest {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }
}

/// Validate a version string against the supported semver grammar: three
/// dot-separated non-negative integers without leading zeros, an optional
/// leading `v`/`V`, and optional `-prerelease` / `+build` suffixes.
pub fn validate_semver(version: &str) -> Result<()> {
    parse_version(version).map(|_| ())
}

/// Parse a version string, tolerating the optional `v`/`V` prefix.
pub fn parse_version(version: &str) -> Result<Version> {
    let trimmed = version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version);
    Version::parse(trimmed).map_err(|e| StoreError::InvalidSemver {
        value: version.to_string(),
        reason: e.to_string(),
    })
}

fn is_hex_digest(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Compute the SHA-256 digest of `data` as lowercase hex.
pub fn compute_checksum(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Verify that the SHA-256 digest of `data` matches `expected_hex`.
///
/// The expected value must be exactly 64 hex characters; comparison is
/// case-insensitive.
pub fn verify_checksum(data: &[u8], expected_hex: &str) -> Result<()> {
    if !is_hex_digest(expected_hex) {
        return Err(StoreError::ChecksumFormat {
            value: expected_hex.to_string(),
        });
    }
    let actual = compute_checksum(data);
    if !actual.eq_ignore_ascii_case(expected_hex) {
        return Err(StoreError::ChecksumMismatch {
            expected: expected_hex.to_lowercase(),
            actual,
        });
    }
    Ok(())
}
