//! Trust-and-dependency engine for the devrig plugin marketplace.
//!
//! Third-party plugins extend the devrig workstation configuration tool
//! with presets, capability packs, and sandboxed WASM providers. Before
//! anything is installed this crate decides whether a plugin can be
//! trusted, whether its requirements can be satisfied without version
//! conflicts, and in what order installation must happen.
//!
//! The core pieces:
//!
//! - [`manifest`]: the canonical plugin descriptor and its invariants.
//! - [`registry`]: a concurrency-safe store of loaded plugins.
//! - [`resolver`]: dependency graph construction, cycle detection, semver
//!   constraint solving and install ordering.
//! - [`trust`]: trust-level derivation, signature-structure checks and
//!   policy enforcement; byte-level cryptography is injected.
//! - [`capability`]: dangerous-capability gating for WASM providers.
//! - [`planner`]: human-reviewable install plans, synthesized before any
//!   mutation.
//! - [`service`]: orchestration over injected discover/install/search
//!   collaborators.

pub mod capability;
pub mod error;
pub mod manifest;
pub mod planner;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod trust;

pub use capability::{CapabilityPolicy, DANGEROUS_CAPABILITIES, KNOWN_CAPABILITIES};
pub use error::{Result, StoreError};
pub use manifest::{
    compute_checksum, parse_version, validate_semver, verify_checksum, Capabilities, Dependency,
    PluginManifest, PluginType, ProviderSpec, SignatureInfo, WasmCapability, WasmConfig,
    API_VERSION, MAX_MANIFEST_SIZE,
};
pub use planner::{format_install_plan, InstallPlan, InstallPlanner};
pub use registry::{Plugin, PluginRegistry, BUILTIN_PREFIX};
pub use resolver::{
    satisfies, DependencyConflict, DependencyResolver, MissingDependency, ResolutionMode,
    ResolutionResult, ResolvedDependency, MAX_RESOLUTION_DEPTH,
};
pub use service::{
    Discoverer, DiscoveryIssue, DiscoveryOutcome, DiscoveryReport, Installer, PendingInstall,
    PluginService, SearchOptions, SearchResult, Searcher,
};
pub use trust::{
    verify_signature_structure, SignatureScheme, SignatureVerifier, TrustEngine, TrustLevel,
    TrustPolicy, VerificationConfig,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
