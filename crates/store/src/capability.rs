//! Sandbox capability gating for WASM provider plugins.
//!
//! The known and dangerous capability sets are immutable, process-wide
//! configuration built once and passed by reference, so concurrent
//! validation needs no locking.

use std::collections::HashSet;
use std::sync::OnceLock;

use crate::error::{Result, StoreError};
use crate::manifest::WasmCapability;

/// Every capability name the host sandbox understands.
pub const KNOWN_CAPABILITIES: &[&str] = &[
    "fs:read",
    "fs:write",
    "net:http",
    "env:read",
    "exec:command",
    "host:config",
    "host:presets",
    "clipboard:read",
    "clipboard:write",
    "notify:send",
];

/// Capabilities that require an explicit justification in the manifest.
pub const DANGEROUS_CAPABILITIES: &[&str] = &["fs:write", "net:http", "env:read", "exec:command"];

/// Allow-list policy for requested sandbox capabilities.
#[derive(Debug, Clone)]
pub struct CapabilityPolicy {
    known: HashSet<String>,
    dangerous: HashSet<String>,
}

impl CapabilityPolicy {
    /// Build a policy from explicit sets. Dangerous names are implicitly
    /// known.
    pub fn new<I, J>(known: I, dangerous: J) -> Self
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
    {
        let dangerous: HashSet<String> = dangerous.into_iter().collect();
        let mut known: HashSet<String> = known.into_iter().collect();
        known.extend(dangerous.iter().cloned());
        Self { known, dangerous }
    }

    /// The host's fixed capability registry, built once per process.
    pub fn builtin() -> &'static CapabilityPolicy {
        static POLICY: OnceLock<CapabilityPolicy> = OnceLock::new();
        POLICY.get_or_init(|| {
            CapabilityPolicy::new(
                KNOWN_CAPABILITIES.iter().map(|s| s.to_string()),
                DANGEROUS_CAPABILITIES.iter().map(|s| s.to_string()),
            )
        })
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.known.contains(name)
    }

    pub fn is_dangerous(&self, name: &str) -> bool {
        self.dangerous.contains(name)
    }

    /// Validate a requested capability list.
    ///
    /// Empty lists are valid. Unknown names are always rejected. Dangerous
    /// capabilities must carry a non-empty justification; the error names
    /// the offender.
    pub fn validate(&self, capabilities: &[WasmCapability]) -> Result<()> {
        for cap in capabilities {
            if !self.is_known(&cap.name) {
                return Err(StoreError::CapabilityNotAllowed {
                    capability: cap.name.clone(),
                });
            }
            if self.is_dangerous(&cap.name) && cap.justification.trim().is_empty() {
                return Err(StoreError::CapabilityJustificationRequired {
                    capability: cap.name.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Default for CapabilityPolicy {
    fn default() -> Self {
        Self::builtin().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap(name: &str, justification: &str) -> WasmCapability {
        WasmCapability {
            name: name.to_string(),
            justification: justification.to_string(),
            optional: false,
        }
    }

    #[test]
    fn empty_list_is_valid() {
        assert!(CapabilityPolicy::builtin().validate(&[]).is_ok());
    }

    #[test]
    fn safe_capability_needs_no_justification() {
        let policy = CapabilityPolicy::builtin();
        assert!(policy.validate(&[cap("fs:read", "")]).is_ok());
    }

    #[test]
    fn dangerous_capability_requires_justification() {
        let policy = CapabilityPolicy::builtin();
        assert!(policy
            .validate(&[cap("exec:command", "runs the user's configured formatter")])
            .is_ok());

        match policy.validate(&[cap("exec:command", "   ")]) {
            Err(StoreError::CapabilityJustificationRequired { capability }) => {
                assert_eq!(capability, "exec:command");
            }
            other => panic!("expected justification error, got {:?}", other),
        }
    }

    #[test]
    fn unknown_capability_always_rejected() {
        let policy = CapabilityPolicy::builtin();
        match policy.validate(&[cap("gpu:compute", "rendering")]) {
            Err(StoreError::CapabilityNotAllowed { capability }) => {
                assert_eq!(capability, "gpu:compute");
            }
            other => panic!("expected not-allowed error, got {:?}", other),
        }
    }

    #[test]
    fn custom_policy_marks_dangerous_as_known() {
        let policy = CapabilityPolicy::new(
            ["tuner:read".to_string()],
            ["tuner:write".to_string()],
        );
        assert!(policy.is_known("tuner:write"));
        assert!(policy.is_dangerous("tuner:write"));
        assert!(!policy.is_dangerous("tuner:read"));
    }
}
