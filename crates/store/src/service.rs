//! Marketplace orchestration.
//!
//! The service wires the pure core (registry, resolver, trust engine,
//! capability policy, planner) to injected collaborators that do the actual
//! slow work: a [`Discoverer`] that scans for local plugins, an
//! [`Installer`] that fetches candidates, and a [`Searcher`] against a
//! remote catalog. Caller-supplied cancellation is honored between every
//! collaborator call; nothing is registered until the caller commits a
//! prepared install.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::capability::CapabilityPolicy;
use crate::error::{Result, StoreError};
use crate::planner::{InstallPlan, InstallPlanner};
use crate::registry::{Plugin, PluginRegistry};
use crate::resolver::{DependencyResolver, ResolutionMode, ResolutionResult};
use crate::trust::{TrustEngine, TrustPolicy, VerificationConfig};

/// One path the discoverer could not load a plugin from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryIssue {
    pub path: String,
    pub reason: String,
}

/// Raw result of a discovery scan.
#[derive(Debug, Default)]
pub struct DiscoveryOutcome {
    pub plugins: Vec<Plugin>,
    pub issues: Vec<DiscoveryIssue>,
}

/// What a discovery run did to the registry.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub registered: usize,
    /// Plugins that could not be registered (usually duplicates), with the
    /// error rendered.
    pub skipped: Vec<DiscoveryIssue>,
    /// Per-path scan failures reported by the discoverer.
    pub scan_issues: Vec<DiscoveryIssue>,
}

/// Query against the remote catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOptions {
    pub text: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub limit: Option<usize>,
}

/// A remote catalog hit. The `verified` flag is the catalog's own trust
/// signal; it feeds install-preview heuristics but never trust derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    pub downloads: Option<u64>,
    pub verified: bool,
    /// Set by the service from the local registry.
    #[serde(default)]
    pub installed: bool,
}

/// Finds plugins on the local machine.
#[async_trait]
pub trait Discoverer: Send + Sync {
    async fn discover(&self, cancel: &CancellationToken) -> Result<DiscoveryOutcome>;

    /// Load a single plugin from a path. Implementations distinguish a
    /// missing manifest ([`StoreError::ManifestNotFound`]) from a manifest
    /// that fails validation.
    async fn load_from_path(&self, path: &str) -> Result<Plugin>;
}

/// Fetches install candidates and removes installed plugins.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Fetch a candidate from `source`. The returned plugin is not yet
    /// registered.
    async fn install(&self, cancel: &CancellationToken, source: &str) -> Result<Plugin>;

    async fn uninstall(&self, name: &str) -> Result<()>;
}

/// Queries the remote plugin catalog.
#[async_trait]
pub trait Searcher: Send + Sync {
    async fn search(
        &self,
        cancel: &CancellationToken,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>>;
}

/// A fully vetted install awaiting caller approval.
///
/// Produced by [`PluginService::prepare_install`]; nothing has mutated the
/// registry yet. Passing it to [`PluginService::commit_install`] is the
/// approval seam.
#[derive(Debug)]
pub struct PendingInstall {
    pub plugin: Plugin,
    pub plan: InstallPlan,
    pub resolution: ResolutionResult,
}

/// Orchestrates discovery, install, search and uninstall over the core
/// engine plus injected collaborators.
pub struct PluginService {
    registry: Arc<PluginRegistry>,
    resolver: DependencyResolver,
    trust: TrustEngine,
    capability_policy: CapabilityPolicy,
    planner: InstallPlanner,
    policy: TrustPolicy,
    discoverer: Arc<dyn Discoverer>,
    installer: Arc<dyn Installer>,
    searcher: Arc<dyn Searcher>,
}

impl PluginService {
    pub fn new(
        registry: Arc<PluginRegistry>,
        discoverer: Arc<dyn Discoverer>,
        installer: Arc<dyn Installer>,
        searcher: Arc<dyn Searcher>,
    ) -> Self {
        let capability_policy = CapabilityPolicy::builtin().clone();
        Self {
            resolver: DependencyResolver::new(Arc::clone(&registry)),
            trust: TrustEngine::new(VerificationConfig::default()),
            planner: InstallPlanner::new(capability_policy.clone()),
            capability_policy,
            policy: TrustPolicy::default(),
            registry,
            discoverer,
            installer,
            searcher,
        }
    }

    pub fn with_trust_engine(mut self, trust: TrustEngine) -> Self {
        self.trust = trust;
        self
    }

    pub fn with_policy(mut self, policy: TrustPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_resolution_mode(mut self, mode: ResolutionMode) -> Self {
        self.resolver = DependencyResolver::with_mode(Arc::clone(&self.registry), mode);
        self
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Run the discoverer and register everything it found. Per-plugin
    /// registration failures are reported, not fatal.
    pub async fn discover(&self, cancel: &CancellationToken) -> Result<DiscoveryReport> {
        self.check_cancelled(cancel)?;
        let outcome = self.discoverer.discover(cancel).await?;
        self.check_cancelled(cancel)?;

        let mut report = DiscoveryReport {
            scan_issues: outcome.issues,
            ..Default::default()
        };
        for plugin in outcome.plugins {
            let name = plugin.name().to_string();
            match self.registry.register(plugin) {
                Ok(()) => report.registered += 1,
                Err(err) => {
                    warn!(plugin = %name, %err, "skipping discovered plugin");
                    report.skipped.push(DiscoveryIssue {
                        path: name,
                        reason: err.to_string(),
                    });
                }
            }
        }
        info!(
            registered = report.registered,
            skipped = report.skipped.len(),
            "discovery finished"
        );
        Ok(report)
    }

    /// Fetch and vet an install candidate, producing a reviewable plan.
    ///
    /// Pipeline: fetch, validate the manifest, resolve dependencies against
    /// the registry, enforce the trust policy, gate WASM capabilities, then
    /// synthesize the plan. Nothing is registered here.
    pub async fn prepare_install(
        &self,
        cancel: &CancellationToken,
        source: &str,
    ) -> Result<PendingInstall> {
        self.check_cancelled(cancel)?;
        let plugin = self.installer.install(cancel, source).await?;
        self.check_cancelled(cancel)?;

        plugin.manifest.validate()?;

        let resolution = self.resolver.resolve(&plugin.manifest)?;
        if resolution.has_errors() {
            return Err(StoreError::DependencyResolution {
                missing: resolution.missing.iter().map(|m| m.name.clone()).collect(),
                conflicts: resolution
                    .conflicts
                    .iter()
                    .map(|c| c.name.clone())
                    .collect(),
            });
        }

        self.trust.enforce_trust_level(Some(&plugin), &self.policy)?;

        if let Some(wasm) = &plugin.manifest.wasm {
            self.capability_policy.validate(&wasm.capabilities)?;
        }

        let plan = self
            .planner
            .create_plan(Some(&plugin.manifest), source)
            .ok_or_else(|| StoreError::InvalidArgument {
                what: "install candidate has no manifest".to_string(),
            })?;

        info!(
            plugin = plugin.name(),
            source,
            trust = %plan.trust_level,
            "install prepared, awaiting approval"
        );
        Ok(PendingInstall {
            plugin,
            plan,
            resolution,
        })
    }

    /// Apply a prepared install. This is the first (and only) mutation of
    /// the install flow.
    pub fn commit_install(&self, pending: PendingInstall) -> Result<()> {
        let name = pending.plugin.name().to_string();
        self.registry.register(pending.plugin)?;
        info!(plugin = %name, "install committed");
        Ok(())
    }

    /// Uninstall a registered plugin: collaborator first, then the registry.
    pub async fn uninstall(&self, name: &str) -> Result<Plugin> {
        if !self.registry.contains(name) {
            return Err(StoreError::PluginNotFound(name.to_string()));
        }
        self.installer.uninstall(name).await?;
        let removed = self.registry.remove(name)?;
        info!(plugin = name, "uninstalled");
        Ok(removed)
    }

    /// Search the remote catalog, marking results already installed
    /// locally.
    pub async fn search(
        &self,
        cancel: &CancellationToken,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        self.check_cancelled(cancel)?;
        let mut results = self.searcher.search(cancel, options).await?;
        for result in &mut results {
            result.installed = self.registry.contains(&result.name);
        }
        Ok(results)
    }

    pub fn list_installed(&self) -> Vec<Plugin> {
        self.registry.list()
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        self.registry.set_enabled(name, enabled)
    }

    fn check_cancelled(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        Ok(())
    }
}
