use thiserror::Error;

use crate::trust::TrustLevel;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid argument: {what}")]
    InvalidArgument { what: String },

    #[error("Plugin name must not be empty")]
    EmptyPluginName,

    #[error("Plugin '{0}' is already registered")]
    PluginAlreadyRegistered(String),

    #[error("Plugin '{0}' not found")]
    PluginNotFound(String),

    #[error("Manifest not found at '{path}'")]
    ManifestNotFound { path: String },

    #[error("Manifest is {size} bytes, exceeds the {limit} byte limit")]
    ManifestTooLarge { size: usize, limit: usize },

    #[error("Invalid manifest '{name}': {reason}")]
    InvalidManifest { name: String, reason: String },

    #[error("Invalid semantic version '{value}': {reason}")]
    InvalidSemver { value: String, reason: String },

    #[error("Invalid checksum format '{value}': expected 64 hex characters")]
    ChecksumFormat { value: String },

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Cyclic dependency: {}", path.join(" -> "))]
    CyclicDependency { path: Vec<String> },

    #[error(
        "Dependency resolution failed: {} missing, {} conflicting",
        missing.len(),
        conflicts.len()
    )]
    DependencyResolution {
        missing: Vec<String>,
        conflicts: Vec<String>,
    },

    #[error("Invalid signature structure: {reason}")]
    SignatureStructure { reason: String },

    #[error("Signature verification failed: {reason}")]
    SignatureVerification { reason: String },

    #[error("Capability '{capability}' is not allowed")]
    CapabilityNotAllowed { capability: String },

    #[error("Dangerous capability '{capability}' requires a justification")]
    CapabilityJustificationRequired { capability: String },

    #[error("Trust level {actual} is below required {required}: {reason}")]
    TrustLevelInsufficient {
        actual: TrustLevel,
        required: TrustLevel,
        reason: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Discovery failed for '{path}': {reason}")]
    DiscoveryFailed { path: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Manifest parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Whether retrying the operation (with the same inputs) could succeed.
    /// Core decisions are deterministic, so only collaborator-boundary
    /// failures qualify.
    pub fn is_recoverable(&self) -> bool {
        match self {
            StoreError::Cancelled => true,
            StoreError::DiscoveryFailed { .. } => true,
            StoreError::IoError(_) => true,
            _ => false,
        }
    }

    /// Whether the error is caused by user-supplied input rather than an
    /// internal failure.
    pub fn is_user_error(&self) -> bool {
        match self {
            StoreError::PluginNotFound(_) => true,
            StoreError::PluginAlreadyRegistered(_) => true,
            StoreError::InvalidManifest { .. } => true,
            StoreError::InvalidSemver { .. } => true,
            StoreError::ChecksumFormat { .. } => true,
            StoreError::ManifestTooLarge { .. } => true,
            StoreError::CapabilityJustificationRequired { .. } => true,
            _ => false,
        }
    }
}
