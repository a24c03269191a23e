//! Dependency graph construction and resolution.
//!
//! The resolver is a pure graph algorithm over the registry: it walks a
//! manifest's `requires` edges depth-first, pins one version per name,
//! detects cycles with a 3-color DFS, and emits an install order via a
//! post-order topological sort. Expected failures (missing or conflicting
//! dependencies) are first-class fields of [`ResolutionResult`], so callers
//! must check [`ResolutionResult::has_errors`]. Only cycles raise.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::manifest::{parse_version, Dependency, PluginManifest};
use crate::registry::PluginRegistry;

/// Recursion ceiling for the dependency walk and the topological sort.
/// Chains deeper than this are treated as unsatisfiable rather than risking
/// a stack overflow on adversarial input.
pub const MAX_RESOLUTION_DEPTH: usize = 256;

/// How version conflicts between transitive requirements are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    /// Any incompatible constraint pair is recorded as a conflict.
    Strict,
    /// The higher of two incompatible constraints wins.
    #[default]
    Latest,
}

/// A dependency pinned to a single satisfying constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDependency {
    pub name: String,
    pub version: String,
}

/// A dependency that could not be satisfied from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingDependency {
    pub name: String,
    pub constraint: String,
    pub required_by: String,
    pub reason: String,
}

/// Two requirements on the same name that cannot both hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyConflict {
    pub name: String,
    pub existing: String,
    pub requested: String,
    pub required_by: String,
}

/// Outcome of a resolution run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub resolved: Vec<ResolvedDependency>,
    pub missing: Vec<MissingDependency>,
    pub conflicts: Vec<DependencyConflict>,
    /// Dependencies before dependents; empty whenever `has_errors()`.
    pub install_order: Vec<String>,
}

impl ResolutionResult {
    pub fn has_errors(&self) -> bool {
        !self.missing.is_empty() || !self.conflicts.is_empty()
    }
}

/// Check whether `version` satisfies `constraint`.
///
/// An empty constraint or an empty version always satisfies. A bare version
/// is an exact match. Otherwise the constraint is an operator (`=`, `>=`,
/// `<=`, `>`, `<`, `^`, `~`) followed by a semver triple. Anything that
/// fails to parse on either side never satisfies.
pub fn satisfies(version: &str, constraint: &str) -> bool {
    let constraint = constraint.trim();
    let version = version.trim();
    if constraint.is_empty() || version.is_empty() {
        return true;
    }
    let version = match parse_version(version) {
        Ok(v) => v,
        Err(_) => return false,
    };
    match parse_constraint(constraint) {
        Some(req) => req.matches(&version),
        None => false,
    }
}

fn split_operator(constraint: &str) -> (Option<&'static str>, &str) {
    for op in [">=", "<="] {
        if let Some(rest) = constraint.strip_prefix(op) {
            return (Some(op), rest);
        }
    }
    for op in ["^", "~", "=", ">", "<"] {
        if let Some(rest) = constraint.strip_prefix(op) {
            return (Some(op), rest);
        }
    }
    (None, constraint)
}

fn parse_constraint(constraint: &str) -> Option<VersionReq> {
    let (op, rest) = split_operator(constraint.trim());
    let version = parse_version(rest.trim()).ok()?;
    // A bare version is an exact requirement, not the caret default the
    // semver crate would apply.
    let req = format!("{}{}", op.unwrap_or("="), version);
    VersionReq::parse(&req).ok()
}

/// The version component of a constraint, used to order two constraints on
/// the same name in `Latest` mode.
fn constraint_base(constraint: &str) -> Option<Version> {
    let (_, rest) = split_operator(constraint.trim());
    parse_version(rest.trim()).ok()
}

/// Resolves a manifest's transitive requirements against a registry.
#[derive(Debug)]
pub struct DependencyResolver {
    registry: Arc<PluginRegistry>,
    mode: ResolutionMode,
}

struct Walk {
    /// Pinned constraint per visited name.
    constraints: HashMap<String, String>,
    /// Requirement edges, parent to children.
    edges: HashMap<String, Vec<String>>,
    result: ResolutionResult,
}

impl DependencyResolver {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self {
            registry,
            mode: ResolutionMode::default(),
        }
    }

    pub fn with_mode(registry: Arc<PluginRegistry>, mode: ResolutionMode) -> Self {
        Self { registry, mode }
    }

    pub fn mode(&self) -> ResolutionMode {
        self.mode
    }

    /// Resolve `manifest`'s requirements.
    ///
    /// Missing and conflicting dependencies live inside the result; a cyclic
    /// graph raises [`StoreError::CyclicDependency`] carrying the exact
    /// cycle path.
    pub fn resolve(&self, manifest: &PluginManifest) -> Result<ResolutionResult> {
        if manifest.name.is_empty() {
            return Err(StoreError::InvalidArgument {
                what: "manifest has an empty name".to_string(),
            });
        }

        let mut walk = Walk {
            constraints: HashMap::new(),
            edges: HashMap::new(),
            result: ResolutionResult::default(),
        };
        walk.constraints
            .insert(manifest.name.clone(), manifest.version.clone());
        walk.edges.insert(manifest.name.clone(), Vec::new());

        self.visit(&mut walk, &manifest.name, &manifest.requires, 0);

        // Cycles are reported even when the walk also found missing or
        // conflicting dependencies.
        if let Some(cycle) = find_cycle(&walk.edges, &manifest.name) {
            return Err(StoreError::CyclicDependency { path: cycle });
        }

        if walk.result.has_errors() {
            debug!(
                missing = walk.result.missing.len(),
                conflicts = walk.result.conflicts.len(),
                "resolution finished with errors; skipping install order"
            );
            return Ok(walk.result);
        }

        walk.result.install_order = topological_order(&walk.edges, &manifest.name);
        Ok(walk.result)
    }

    fn visit(&self, walk: &mut Walk, parent: &str, requires: &[Dependency], depth: usize) {
        for dep in requires {
            if depth >= MAX_RESOLUTION_DEPTH {
                warn!(
                    plugin = %dep.name,
                    depth,
                    "dependency chain exceeds resolution depth limit"
                );
                walk.result.missing.push(MissingDependency {
                    name: dep.name.clone(),
                    constraint: dep.version.clone(),
                    required_by: parent.to_string(),
                    reason: format!("dependency chain exceeds depth limit {}", MAX_RESOLUTION_DEPTH),
                });
                continue;
            }

            if let Some(existing) = walk.constraints.get(&dep.name).cloned() {
                self.revisit(walk, parent, dep, &existing);
                continue;
            }

            let plugin = match self.registry.get(&dep.name) {
                Some(plugin) => plugin,
                None => {
                    walk.result.missing.push(MissingDependency {
                        name: dep.name.clone(),
                        constraint: dep.version.clone(),
                        required_by: parent.to_string(),
                        reason: "not registered".to_string(),
                    });
                    continue;
                }
            };

            let registered = plugin.manifest.version.clone();
            if !satisfies(&registered, &dep.version) {
                walk.result.missing.push(MissingDependency {
                    name: dep.name.clone(),
                    constraint: dep.version.clone(),
                    required_by: parent.to_string(),
                    reason: format!(
                        "registered version '{}' does not satisfy '{}'",
                        registered, dep.version
                    ),
                });
                continue;
            }

            let pinned = if dep.version.trim().is_empty() {
                registered
            } else {
                dep.version.clone()
            };
            walk.constraints.insert(dep.name.clone(), dep.version.clone());
            walk.result.resolved.push(ResolvedDependency {
                name: dep.name.clone(),
                version: pinned,
            });
            walk.edges
                .entry(parent.to_string())
                .or_default()
                .push(dep.name.clone());
            walk.edges.entry(dep.name.clone()).or_default();

            self.visit(walk, &dep.name, &plugin.manifest.requires, depth + 1);
        }
    }

    /// Handle a name the walk has already pinned. Revisits are not expanded
    /// again, but the declared edge is always recorded so cycle detection
    /// sees the full graph, even when the revisit is incompatible.
    fn revisit(&self, walk: &mut Walk, parent: &str, dep: &Dependency, existing: &str) {
        walk.edges
            .entry(parent.to_string())
            .or_default()
            .push(dep.name.clone());

        let registered = self
            .registry
            .get(&dep.name)
            .map(|p| p.manifest.version.clone())
            .unwrap_or_else(|| existing.to_string());

        let compatible = existing == dep.version
            || (satisfies(&registered, existing) && satisfies(&registered, &dep.version));

        if compatible {
            return;
        }

        match self.mode {
            ResolutionMode::Strict => {
                walk.result.conflicts.push(DependencyConflict {
                    name: dep.name.clone(),
                    existing: existing.to_string(),
                    requested: dep.version.clone(),
                    required_by: parent.to_string(),
                });
            }
            ResolutionMode::Latest => {
                let keep_requested = match (constraint_base(existing), constraint_base(&dep.version))
                {
                    (Some(old), Some(new)) => new > old,
                    (None, Some(_)) => true,
                    _ => false,
                };
                let kept = if keep_requested {
                    dep.version.clone()
                } else {
                    existing.to_string()
                };
                debug!(
                    plugin = %dep.name,
                    existing,
                    requested = %dep.version,
                    kept = %kept,
                    "constraint superseded in latest mode"
                );
                walk.constraints.insert(dep.name.clone(), kept.clone());
                if let Some(entry) = walk
                    .result
                    .resolved
                    .iter_mut()
                    .find(|r| r.name == dep.name)
                {
                    entry.version = kept.clone();
                }
                if !satisfies(&registered, &kept) {
                    walk.result.missing.push(MissingDependency {
                        name: dep.name.clone(),
                        constraint: kept,
                        required_by: parent.to_string(),
                        reason: format!(
                            "registered version '{}' does not satisfy superseding constraint",
                            registered
                        ),
                    });
                }
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// 3-color DFS cycle detection. Returns the exact cycle path, closed with a
/// repeat of the entry node, when one exists.
fn find_cycle(edges: &HashMap<String, Vec<String>>, root: &str) -> Option<Vec<String>> {
    fn dfs(
        node: &str,
        edges: &HashMap<String, Vec<String>>,
        colors: &mut HashMap<String, Color>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        colors.insert(node.to_string(), Color::Gray);
        path.push(node.to_string());

        if let Some(children) = edges.get(node) {
            for child in children {
                match colors.get(child).copied().unwrap_or(Color::White) {
                    Color::Gray => {
                        let start = path.iter().position(|n| n == child).unwrap_or(0);
                        let mut cycle: Vec<String> = path[start..].to_vec();
                        cycle.push(child.clone());
                        return Some(cycle);
                    }
                    Color::White => {
                        if let Some(cycle) = dfs(child, edges, colors, path) {
                            return Some(cycle);
                        }
                    }
                    Color::Black => {}
                }
            }
        }

        path.pop();
        colors.insert(node.to_string(), Color::Black);
        None
    }

    let mut colors = HashMap::new();
    let mut path = Vec::new();
    dfs(root, edges, &mut colors, &mut path)
}

/// Post-order DFS topological sort: a node is emitted only after all of its
/// out-edges, so dependencies precede dependents. Assumes an acyclic graph.
fn topological_order(edges: &HashMap<String, Vec<String>>, root: &str) -> Vec<String> {
    fn dfs(
        node: &str,
        edges: &HashMap<String, Vec<String>>,
        visited: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) {
        if !visited.insert(node.to_string()) {
            return;
        }
        if let Some(children) = edges.get(node) {
            for child in children {
                dfs(child, edges, visited, order);
            }
        }
        order.push(node.to_string());
    }

    let mut visited = HashSet::new();
    let mut order = Vec::new();
    dfs(root, edges, &mut visited, &mut order);
    order
}
