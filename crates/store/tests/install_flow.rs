//! End-to-end exercise of the install pipeline: discovery, dependency
//! resolution, trust enforcement, plan review, commit, and uninstall.

use std::sync::Arc;

use async_trait::async_trait;
use devrig_store::{
    format_install_plan, Dependency, Discoverer, DiscoveryOutcome, Installer, Plugin,
    PluginManifest, PluginRegistry, PluginService, PluginType, ProviderSpec, Result, SearchOptions,
    SearchResult, Searcher, StoreError, TrustLevel, WasmCapability, WasmConfig,
};
use tokio_util::sync::CancellationToken;

struct FixtureDiscoverer {
    plugins: Vec<Plugin>,
}

#[async_trait]
impl Discoverer for FixtureDiscoverer {
    async fn discover(&self, _cancel: &CancellationToken) -> Result<DiscoveryOutcome> {
        Ok(DiscoveryOutcome {
            plugins: self.plugins.clone(),
            issues: Vec::new(),
        })
    }

    async fn load_from_path(&self, path: &str) -> Result<Plugin> {
        self.plugins
            .iter()
            .find(|p| p.path == path)
            .cloned()
            .ok_or_else(|| StoreError::ManifestNotFound {
                path: path.to_string(),
            })
    }
}

struct FixtureInstaller {
    candidate: Plugin,
}

#[async_trait]
impl Installer for FixtureInstaller {
    async fn install(&self, _cancel: &CancellationToken, _source: &str) -> Result<Plugin> {
        Ok(self.candidate.clone())
    }

    async fn uninstall(&self, _name: &str) -> Result<()> {
        Ok(())
    }
}

struct EmptySearcher;

#[async_trait]
impl Searcher for EmptySearcher {
    async fn search(
        &self,
        _cancel: &CancellationToken,
        _options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        Ok(Vec::new())
    }
}

fn preset_plugin(name: &str, version: &str) -> Plugin {
    let mut manifest = PluginManifest::new(name, version, PluginType::Config);
    manifest.provides.presets.push(format!("{}-default", name));
    Plugin::new(manifest, format!("/plugins/{}", name))
}

fn provider_candidate() -> Plugin {
    let mut manifest = PluginManifest::new("cloud-provider", "1.2.0", PluginType::Provider);
    manifest.provides.providers.push(ProviderSpec {
        name: "cloud".to_string(),
        config_key: "providers.cloud".to_string(),
        description: "cloud credentials provider".to_string(),
    });
    manifest.requires.push(Dependency {
        name: "base-presets".to_string(),
        version: "^1.0.0".to_string(),
    });
    manifest.requires.push(Dependency {
        name: "shared-helpers".to_string(),
        version: String::new(),
    });
    manifest.wasm = Some(WasmConfig {
        module: "provider.wasm".to_string(),
        checksum: "d".repeat(64),
        capabilities: vec![WasmCapability {
            name: "net:http".to_string(),
            justification: "refreshes short-lived credentials".to_string(),
            optional: false,
        }],
    });
    Plugin::new(manifest, "/plugins/cloud-provider")
}

#[tokio::test]
async fn full_install_pipeline() {
    let registry = Arc::new(PluginRegistry::new());
    let discoverer = FixtureDiscoverer {
        plugins: vec![
            preset_plugin("base-presets", "1.4.0"),
            preset_plugin("shared-helpers", "0.9.0"),
        ],
    };
    let installer = FixtureInstaller {
        candidate: provider_candidate(),
    };
    let service = PluginService::new(
        Arc::clone(&registry),
        Arc::new(discoverer),
        Arc::new(installer),
        Arc::new(EmptySearcher),
    );
    let token = CancellationToken::new();

    // Discovery seeds the registry with the locally available plugins.
    let report = service.discover(&token).await.unwrap();
    assert_eq!(report.registered, 2);

    // Preparation vets the candidate without touching the registry.
    let pending = service
        .prepare_install(&token, "catalog:cloud-provider")
        .await
        .unwrap();
    assert!(!registry.contains("cloud-provider"));
    assert_eq!(pending.plan.trust_level, TrustLevel::Community);
    assert!(pending
        .plan
        .warnings
        .iter()
        .any(|w| w.contains("net:http")));

    // Dependencies come before the dependent in the install order.
    let order = &pending.resolution.install_order;
    let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
    assert!(pos("base-presets") < pos("cloud-provider"));
    assert!(pos("shared-helpers") < pos("cloud-provider"));

    // The rendered plan is reviewable text covering every action.
    let text = format_install_plan(&pending.plan);
    assert!(text.contains("install plugin cloud-provider@1.2.0"));
    assert!(text.contains("register provider 'cloud'"));

    // Approval is the only mutation point.
    service.commit_install(pending).unwrap();
    assert!(registry.contains("cloud-provider"));

    // And uninstall cleanly reverses it.
    service.uninstall("cloud-provider").await.unwrap();
    assert!(!registry.contains("cloud-provider"));
}
