//! Install plan synthesis.
//!
//! A plan is a human-reviewable, read-only preview of everything an install
//! would do. Nothing in the engine mutates state until the caller has seen
//! the plan and committed it.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityPolicy;
use crate::manifest::{Dependency, PluginManifest, PluginType, WasmCapability};
use crate::trust::TrustLevel;

/// Dry-run preview of an installation. Never partially applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallPlan {
    pub source: String,
    pub manifest: PluginManifest,
    pub dependencies: Vec<Dependency>,
    pub capabilities: Vec<WasmCapability>,
    pub trust_level: TrustLevel,
    pub warnings: Vec<String>,
    pub actions: Vec<String>,
}

/// Builds install plans from validated manifests.
#[derive(Debug, Clone)]
pub struct InstallPlanner {
    capability_policy: CapabilityPolicy,
}

impl Default for InstallPlanner {
    fn default() -> Self {
        Self {
            capability_policy: CapabilityPolicy::builtin().clone(),
        }
    }
}

impl InstallPlanner {
    pub fn new(capability_policy: CapabilityPolicy) -> Self {
        Self { capability_policy }
    }

    /// Synthesize a plan for installing `manifest` from `source`.
    ///
    /// A missing manifest yields no plan rather than an error. Trust is
    /// assigned structurally: a signature block earns Verified plus a
    /// verification action, its absence earns Community plus a
    /// manual-vetting warning.
    pub fn create_plan(
        &self,
        manifest: Option<&PluginManifest>,
        source: &str,
    ) -> Option<InstallPlan> {
        let manifest = manifest?;

        let mut warnings = Vec::new();
        let mut actions = Vec::new();

        let capabilities: Vec<WasmCapability> =
            if manifest.plugin_type == PluginType::Provider {
                manifest
                    .wasm
                    .as_ref()
                    .map(|w| w.capabilities.clone())
                    .unwrap_or_default()
            } else {
                Vec::new()
            };

        for cap in &capabilities {
            if self.capability_policy.is_dangerous(&cap.name) {
                warnings.push(format!(
                    "plugin requests dangerous capability '{}': \"{}\"",
                    cap.name, cap.justification
                ));
            }
        }

        let trust_level = if manifest.signature.is_some() {
            let key_id = manifest
                .signature
                .as_ref()
                .map(|s| s.key_id.as_str())
                .unwrap_or_default();
            actions.push(format!("verify signature with key '{}'", key_id));
            TrustLevel::Verified
        } else {
            warnings.push(
                "plugin is unsigned; manual vetting is recommended before install".to_string(),
            );
            TrustLevel::Community
        };

        actions.push(format!(
            "install plugin {}@{}",
            manifest.name, manifest.version
        ));
        for provider in &manifest.provides.providers {
            actions.push(format!("register provider '{}'", provider.name));
        }
        if !manifest.provides.presets.is_empty() {
            actions.push(format!(
                "register {} preset(s)",
                manifest.provides.presets.len()
            ));
        }
        if !manifest.provides.capability_packs.is_empty() {
            actions.push(format!(
                "register {} capability pack(s)",
                manifest.provides.capability_packs.len()
            ));
        }
        for dep in &manifest.requires {
            if dep.version.is_empty() {
                actions.push(format!("install dependency {}", dep.name));
            } else {
                actions.push(format!("install dependency {}@{}", dep.name, dep.version));
            }
        }

        Some(InstallPlan {
            source: source.to_string(),
            manifest: manifest.clone(),
            dependencies: manifest.requires.clone(),
            capabilities,
            trust_level,
            warnings,
            actions,
        })
    }
}

/// Render a plan as sectioned human-readable text. Purely presentational.
pub fn format_install_plan(plan: &InstallPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Install plan: {}@{} (from {})",
        plan.manifest.name, plan.manifest.version, plan.source
    );
    let _ = writeln!(out, "Trust level: {}", plan.trust_level);

    if !plan.dependencies.is_empty() {
        let _ = writeln!(out, "Dependencies:");
        for dep in &plan.dependencies {
            if dep.version.is_empty() {
                let _ = writeln!(out, "  - {} (any version)", dep.name);
            } else {
                let _ = writeln!(out, "  - {} {}", dep.name, dep.version);
            }
        }
    }

    if !plan.capabilities.is_empty() {
        let _ = writeln!(out, "Capabilities:");
        for cap in &plan.capabilities {
            let optional = if cap.optional { " (optional)" } else { "" };
            let _ = writeln!(out, "  - {}{}", cap.name, optional);
        }
    }

    if !plan.warnings.is_empty() {
        let _ = writeln!(out, "Warnings:");
        for warning in &plan.warnings {
            let _ = writeln!(out, "  ! {}", warning);
        }
    }

    let _ = writeln!(out, "Actions:");
    for (i, action) in plan.actions.iter().enumerate() {
        let _ = writeln!(out, "  {}. {}", i + 1, action);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ProviderSpec, SignatureInfo, WasmConfig};

    fn provider_manifest() -> PluginManifest {
        let mut manifest = PluginManifest::new("aws-provider", "2.1.0", PluginType::Provider);
        manifest.provides.providers.push(ProviderSpec {
            name: "aws".to_string(),
            config_key: "providers.aws".to_string(),
            description: String::new(),
        });
        manifest.requires.push(Dependency {
            name: "base-presets".to_string(),
            version: ">=1.0.0".to_string(),
        });
        manifest.requires.push(Dependency {
            name: "shared-helpers".to_string(),
            version: String::new(),
        });
        manifest.wasm = Some(WasmConfig {
            module: "provider.wasm".to_string(),
            checksum: "a".repeat(64),
            capabilities: vec![
                WasmCapability {
                    name: "net:http".to_string(),
                    justification: "fetches temporary credentials".to_string(),
                    optional: false,
                },
                WasmCapability {
                    name: "fs:read".to_string(),
                    justification: String::new(),
                    optional: true,
                },
            ],
        });
        manifest
    }

    #[test]
    fn nil_manifest_yields_no_plan() {
        let planner = InstallPlanner::default();
        assert!(planner.create_plan(None, "registry").is_none());
    }

    #[test]
    fn unsigned_plugin_gets_community_and_vetting_warning() {
        let planner = InstallPlanner::default();
        let manifest = provider_manifest();
        let plan = planner.create_plan(Some(&manifest), "registry").unwrap();

        assert_eq!(plan.trust_level, TrustLevel::Community);
        assert!(plan.warnings.iter().any(|w| w.contains("manual vetting")));
        assert!(!plan.actions.iter().any(|a| a.contains("verify signature")));
    }

    #[test]
    fn signed_plugin_gets_verified_and_verify_action() {
        let planner = InstallPlanner::default();
        let mut manifest = provider_manifest();
        manifest.signature = Some(SignatureInfo {
            sig_type: "ssh".to_string(),
            key_id: "ops@devrig.dev".to_string(),
            data: "c2lnbmF0dXJlLWJ5dGVz".to_string(),
        });
        let plan = planner.create_plan(Some(&manifest), "registry").unwrap();

        assert_eq!(plan.trust_level, TrustLevel::Verified);
        assert!(plan.actions[0].contains("verify signature"));
        assert!(plan.actions[0].contains("ops@devrig.dev"));
    }

    #[test]
    fn dangerous_capability_warning_quotes_justification() {
        let planner = InstallPlanner::default();
        let manifest = provider_manifest();
        let plan = planner.create_plan(Some(&manifest), "registry").unwrap();

        let warning = plan
            .warnings
            .iter()
            .find(|w| w.contains("net:http"))
            .expect("dangerous capability warning present");
        assert!(warning.contains("fetches temporary credentials"));
        // fs:read is not dangerous, so no warning for it.
        assert!(!plan.warnings.iter().any(|w| w.contains("fs:read")));
    }

    #[test]
    fn actions_follow_fixed_order() {
        let planner = InstallPlanner::default();
        let mut manifest = provider_manifest();
        manifest.provides.presets.push("aws-defaults".to_string());
        manifest
            .provides
            .capability_packs
            .push("aws-pack".to_string());
        let plan = planner.create_plan(Some(&manifest), "registry").unwrap();

        assert_eq!(
            plan.actions,
            vec![
                "install plugin aws-provider@2.1.0",
                "register provider 'aws'",
                "register 1 preset(s)",
                "register 1 capability pack(s)",
                "install dependency base-presets@>=1.0.0",
                "install dependency shared-helpers",
            ]
        );
    }

    #[test]
    fn plan_copies_requires_and_capabilities() {
        let planner = InstallPlanner::default();
        let manifest = provider_manifest();
        let plan = planner.create_plan(Some(&manifest), "registry").unwrap();

        assert_eq!(plan.dependencies.len(), 2);
        assert_eq!(plan.capabilities.len(), 2);
        assert_eq!(plan.source, "registry");
    }

    #[test]
    fn format_renders_every_section() {
        let planner = InstallPlanner::default();
        let manifest = provider_manifest();
        let plan = planner.create_plan(Some(&manifest), "registry").unwrap();
        let text = format_install_plan(&plan);

        assert!(text.contains("aws-provider@2.1.0"));
        assert!(text.contains("Trust level: community"));
        assert!(text.contains("base-presets >=1.0.0"));
        assert!(text.contains("shared-helpers (any version)"));
        assert!(text.contains("net:http"));
        assert!(text.contains("fs:read (optional)"));
        for action in &plan.actions {
            assert!(text.contains(action.as_str()));
        }
        for warning in &plan.warnings {
            assert!(text.contains(warning.as_str()));
        }
    }
}
