//! Concurrency-safe store of loaded plugins.
//!
//! The registry is the only shared mutable state in the engine. A single
//! reader/writer lock guards the name-to-plugin map: register and remove
//! take exclusive access, everything else takes shared access. Reads return
//! deep copies, so callers can never corrupt registry state or race a
//! writer through a returned value.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::manifest::PluginManifest;

/// Path prefix marking plugins shipped with the host itself.
pub const BUILTIN_PREFIX: &str = "builtin:";

/// A loaded plugin: manifest plus runtime state.
///
/// Immutable once registered except for the `enabled` flag, which is
/// toggled through the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plugin {
    pub manifest: PluginManifest,
    /// Filesystem path the plugin was loaded from, or a synthetic
    /// `builtin:` marker for plugins shipped with the host.
    pub path: String,
    pub enabled: bool,
    pub loaded_at: DateTime<Utc>,
}

impl Plugin {
    pub fn new(manifest: PluginManifest, path: impl Into<String>) -> Self {
        Self {
            manifest,
            path: path.into(),
            enabled: true,
            loaded_at: Utc::now(),
        }
    }

    /// Create a plugin carrying the synthetic builtin marker.
    pub fn builtin(manifest: PluginManifest) -> Self {
        let path = format!("{}{}", BUILTIN_PREFIX, manifest.name);
        Self::new(manifest, path)
    }

    pub fn is_builtin(&self) -> bool {
        self.path.starts_with(BUILTIN_PREFIX)
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }
}

/// Name-keyed registry of loaded plugins.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin. Fails on an empty name or a duplicate.
    pub fn register(&self, plugin: Plugin) -> Result<()> {
        if plugin.name().is_empty() {
            return Err(StoreError::EmptyPluginName);
        }
        let mut plugins = self.plugins.write().expect("registry lock poisoned");
        if plugins.contains_key(plugin.name()) {
            return Err(StoreError::PluginAlreadyRegistered(plugin.name().to_string()));
        }
        info!(
            plugin = plugin.name(),
            version = %plugin.manifest.version,
            "registered plugin"
        );
        plugins.insert(plugin.name().to_string(), plugin);
        Ok(())
    }

    /// Remove a plugin, returning it.
    pub fn remove(&self, name: &str) -> Result<Plugin> {
        let mut plugins = self.plugins.write().expect("registry lock poisoned");
        let removed = plugins
            .remove(name)
            .ok_or_else(|| StoreError::PluginNotFound(name.to_string()))?;
        debug!(plugin = name, "removed plugin");
        Ok(removed)
    }

    /// Get a deep copy of a plugin by name.
    pub fn get(&self, name: &str) -> Option<Plugin> {
        self.plugins
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
    }

    /// List deep copies of all plugins, ordered lexicographically by name
    /// so display and diff output is deterministic.
    pub fn list(&self) -> Vec<Plugin> {
        let mut plugins: Vec<Plugin> = self
            .plugins
            .read()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect();
        plugins.sort_by(|a, b| a.manifest.name.cmp(&b.manifest.name));
        plugins
    }

    /// Sorted plugin names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .plugins
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Toggle the only mutable field of a registered plugin.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut plugins = self.plugins.write().expect("registry lock poisoned");
        let plugin = plugins
            .get_mut(name)
            .ok_or_else(|| StoreError::PluginNotFound(name.to_string()))?;
        plugin.enabled = enabled;
        debug!(plugin = name, enabled, "toggled plugin");
        Ok(())
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.plugins
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .map(|p| p.enabled)
            .unwrap_or(false)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins
            .read()
            .expect("registry lock poisoned")
            .contains_key(name)
    }

    pub fn count(&self) -> usize {
        self.plugins.read().expect("registry lock poisoned").len()
    }
}
