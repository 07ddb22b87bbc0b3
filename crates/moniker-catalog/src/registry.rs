//! The catalog registry: a hierarchical store of nodes.
//!
//! Paths form a single namespace in which `.` and `/` both introduce one level
//! of nesting. The registry keeps nodes, a parent → children index, and the
//! append-only audit log behind one reader/writer lock: reads run
//! concurrently, and every write (including its audit entry) is applied under
//! a single write guard so it is observed whole or not at all.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use moniker_core::moniker::validate_path;
use moniker_core::observability::catalog_span;
use moniker_core::path::{ancestor_paths, parent_path};

use crate::audit::{AuditAction, AuditEntry};
use crate::domain::DomainRegistry;
use crate::error::{Result, poison_err};
use crate::metrics;
use crate::node::{CatalogNode, NodeStatus, SourceType};
use crate::ownership::{Ownership, OwnershipPatch, ResolvedOwnership};

/// Actor recorded for system-initiated mutations.
pub const SYSTEM_ACTOR: &str = "system";

/// An edit to a node's descriptive metadata. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePatch {
    /// New display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
    /// New classification.
    #[serde(default)]
    pub classification: Option<String>,
    /// Replacement tag set.
    #[serde(default)]
    pub tags: Option<BTreeSet<String>>,
    /// New successor path.
    #[serde(default)]
    pub successor: Option<String>,
    /// New deprecation message.
    #[serde(default)]
    pub deprecation_message: Option<String>,
    /// Metadata entries to merge (a `null` value removes the key).
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl NodePatch {
    /// Applies the patch, returning the names of the fields it changed.
    fn apply(&self, node: &mut CatalogNode) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if let Some(value) = &self.display_name {
            node.display_name.clone_from(value);
            changed.push("display_name");
        }
        if let Some(value) = &self.description {
            node.description.clone_from(value);
            changed.push("description");
        }
        if let Some(value) = &self.classification {
            node.classification.clone_from(value);
            changed.push("classification");
        }
        if let Some(value) = &self.tags {
            node.tags.clone_from(value);
            changed.push("tags");
        }
        if let Some(value) = &self.successor {
            node.successor = Some(value.clone());
            changed.push("successor");
        }
        if let Some(value) = &self.deprecation_message {
            node.deprecation_message = Some(value.clone());
            changed.push("deprecation_message");
        }
        if !self.metadata.is_empty() {
            for (key, value) in &self.metadata {
                if value.is_null() {
                    node.metadata.remove(key);
                } else {
                    node.metadata.insert(key.clone(), value.clone());
                }
            }
            changed.push("metadata");
        }
        changed
    }
}

/// The node carrying the source binding that serves a path.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingMatch {
    /// Path of the node that carries the binding.
    pub binding_path: String,
    /// The bound node.
    pub node: CatalogNode,
}

/// Catalog-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    /// Number of registered nodes.
    pub total: usize,
    /// Nodes per lifecycle status (every status present).
    pub by_status: BTreeMap<NodeStatus, usize>,
    /// Leaves per source type.
    pub by_source_type: BTreeMap<SourceType, usize>,
    /// Nodes with a source binding.
    pub leaves: usize,
    /// Entries in the audit log.
    pub audit_entries: usize,
}

/// A nested view of part of the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogTree {
    /// Path of this level (`""` for the virtual root).
    pub path: String,
    /// Display name, when the path is registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Status, when the path is registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<NodeStatus>,
    /// Whether the node has a source binding.
    pub is_leaf: bool,
    /// Direct children, sorted by path.
    pub children: Vec<CatalogTree>,
}

#[derive(Debug, Default)]
struct RegistryState {
    nodes: BTreeMap<String, CatalogNode>,
    children: HashMap<String, BTreeSet<String>>,
    audit: Vec<AuditEntry>,
}

impl RegistryState {
    fn insert(&mut self, node: CatalogNode) {
        let parent = parent_path(&node.path).unwrap_or_default().to_string();
        self.children
            .entry(parent)
            .or_default()
            .insert(node.path.clone());
        self.nodes.insert(node.path.clone(), node);
    }

    fn ownership_chain<'a>(&'a self, path: &'a str) -> Vec<(&'a str, &'a Ownership)> {
        std::iter::once(path)
            .chain(ancestor_paths(path))
            .filter_map(|p| self.nodes.get(p).map(|node| (p, &node.ownership)))
            .collect()
    }

    fn tree(&self, path: &str, depth: usize) -> CatalogTree {
        let node = self.nodes.get(path);
        let children = if depth == 0 {
            Vec::new()
        } else {
            self.children
                .get(path)
                .map(|children| {
                    children
                        .iter()
                        .map(|child| self.tree(child, depth - 1))
                        .collect()
                })
                .unwrap_or_default()
        };
        CatalogTree {
            path: path.to_string(),
            display_name: node.map(|n| n.display_name.clone()),
            status: node.map(|n| n.status),
            is_leaf: node.is_some_and(CatalogNode::is_leaf),
            children,
        }
    }
}

/// Thread-safe hierarchical store of catalog nodes.
#[derive(Debug, Default)]
pub struct CatalogRegistry {
    state: RwLock<RegistryState>,
}

impl CatalogRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the node at its path.
    ///
    /// Parent existence is not checked. The path must be a valid moniker path.
    ///
    /// # Errors
    ///
    /// Returns a parse error for an invalid path, a validation error for an
    /// access policy whose patterns do not compile, or an internal error if
    /// the lock is poisoned.
    pub fn register(&self, node: CatalogNode) -> Result<()> {
        let node = checked(node)?;
        let mut state = self.state.write().map_err(poison_err)?;
        tracing::debug!(path = %node.path, status = %node.status, "registering catalog node");
        state.insert(node);
        metrics::record_node_count(state.nodes.len());
        Ok(())
    }

    /// Registers many nodes under one write guard.
    ///
    /// All paths are validated before any node is inserted.
    ///
    /// # Errors
    ///
    /// Returns a parse error for the first invalid path (nothing is inserted),
    /// or an internal error if the lock is poisoned.
    pub fn register_all(&self, nodes: impl IntoIterator<Item = CatalogNode>) -> Result<usize> {
        let nodes = canonicalize(nodes)?;
        let count = nodes.len();
        let mut state = self.state.write().map_err(poison_err)?;
        for node in nodes {
            state.insert(node);
        }
        metrics::record_node_count(state.nodes.len());
        Ok(count)
    }

    /// Atomically replaces the whole node set, keeping the audit log.
    ///
    /// # Errors
    ///
    /// Returns a parse error for the first invalid path (nothing changes), or
    /// an internal error if the lock is poisoned.
    pub fn replace_all(&self, nodes: impl IntoIterator<Item = CatalogNode>) -> Result<usize> {
        let nodes = canonicalize(nodes)?;
        let count = nodes.len();
        let mut fresh = RegistryState::default();
        for node in nodes {
            fresh.insert(node);
        }

        let mut state = self.state.write().map_err(poison_err)?;
        fresh.audit = std::mem::take(&mut state.audit);
        fresh.audit.push(
            AuditEntry::new("", AuditAction::CatalogReloaded, SYSTEM_ACTOR)
                .with_details(format!("{count} nodes loaded")),
        );
        *state = fresh;
        metrics::record_node_count(count);
        tracing::info!(nodes = count, "catalog node set replaced");
        Ok(count)
    }

    /// Returns the node at exactly `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn get(&self, path: &str) -> Result<Option<CatalogNode>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.nodes.get(path).cloned())
    }

    /// Returns true if a node is registered at exactly `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn exists(&self, path: &str) -> Result<bool> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.nodes.contains_key(path))
    }

    /// Returns the registered direct children of `path`, sorted.
    ///
    /// `""` yields the top-level domains.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn children_paths(&self, path: &str) -> Result<Vec<String>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .children
            .get(path)
            .map(|children| children.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Returns every registered path, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn all_paths(&self) -> Result<Vec<String>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.nodes.keys().cloned().collect())
    }

    /// Returns every registered node, sorted by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn all_nodes(&self) -> Result<Vec<CatalogNode>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.nodes.values().cloned().collect())
    }

    /// Returns the number of registered nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.state.read().map_err(poison_err)?.nodes.len())
    }

    /// Returns true if no node is registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Case-insensitive substring search over path, display name, description
    /// and tags, optionally restricted to one lifecycle status. Results are
    /// ordered by path and capped at `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn search(
        &self,
        query: &str,
        status: Option<NodeStatus>,
        limit: usize,
    ) -> Result<Vec<CatalogNode>> {
        let needle = query.trim().to_lowercase();
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .nodes
            .values()
            .filter(|node| status.is_none_or(|status| node.status == status))
            .filter(|node| node.matches_text(&needle))
            .take(limit)
            .cloned()
            .collect())
    }

    /// Returns node counts per lifecycle status; every status is present.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn count(&self) -> Result<BTreeMap<NodeStatus, usize>> {
        let state = self.state.read().map_err(poison_err)?;
        let mut counts: BTreeMap<NodeStatus, usize> =
            NodeStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        for node in state.nodes.values() {
            *counts.entry(node.status).or_default() += 1;
        }
        Ok(counts)
    }

    /// Returns catalog-wide counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn stats(&self) -> Result<CatalogStats> {
        let by_status = self.count()?;
        let state = self.state.read().map_err(poison_err)?;
        let mut by_source_type = BTreeMap::new();
        for binding in state.nodes.values().filter_map(|n| n.source_binding.as_ref()) {
            *by_source_type.entry(binding.source_type).or_default() += 1;
        }
        Ok(CatalogStats {
            total: state.nodes.len(),
            leaves: by_source_type.values().sum(),
            by_status,
            by_source_type,
            audit_entries: state.audit.len(),
        })
    }

    /// Sets the lifecycle status of `path`, recording an audit entry.
    ///
    /// Returns `None` if the path is not registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn update_status(
        &self,
        path: &str,
        status: NodeStatus,
        actor: &str,
    ) -> Result<Option<CatalogNode>> {
        let _span = catalog_span("update_status", path).entered();
        let mut state = self.state.write().map_err(poison_err)?;
        let Some(node) = state.nodes.get_mut(path) else {
            return Ok(None);
        };
        let old = node.status;
        node.status = status;
        node.updated_at = Some(Utc::now());
        let updated = node.clone();
        state.audit.push(
            AuditEntry::new(path, AuditAction::StatusChanged, actor)
                .with_change(old.as_str(), status.as_str()),
        );
        tracing::info!(%old, new = %status, actor, "node status updated");
        Ok(Some(updated))
    }

    /// Edits the ownership defined at `path`, recording an audit entry.
    ///
    /// Returns `None` if the path is not registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn update_ownership(
        &self,
        path: &str,
        patch: &OwnershipPatch,
        actor: &str,
    ) -> Result<Option<CatalogNode>> {
        let _span = catalog_span("update_ownership", path).entered();
        let mut state = self.state.write().map_err(poison_err)?;
        let Some(node) = state.nodes.get_mut(path) else {
            return Ok(None);
        };
        node.ownership.apply(patch);
        node.updated_at = Some(Utc::now());
        let updated = node.clone();
        let roles: Vec<&str> = patch.0.keys().map(|role| role.as_str()).collect();
        state.audit.push(
            AuditEntry::new(path, AuditAction::OwnershipUpdated, actor)
                .with_details(format!("roles: {}", roles.join(", "))),
        );
        Ok(Some(updated))
    }

    /// Edits descriptive metadata at `path`, recording an audit entry.
    ///
    /// Returns `None` if the path is not registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn update_metadata(
        &self,
        path: &str,
        patch: &NodePatch,
        actor: &str,
    ) -> Result<Option<CatalogNode>> {
        let _span = catalog_span("update_metadata", path).entered();
        let mut state = self.state.write().map_err(poison_err)?;
        let Some(node) = state.nodes.get_mut(path) else {
            return Ok(None);
        };
        let changed = patch.apply(node);
        node.updated_at = Some(Utc::now());
        let updated = node.clone();
        state.audit.push(
            AuditEntry::new(path, AuditAction::MetadataUpdated, actor)
                .with_details(format!("fields: {}", changed.join(", "))),
        );
        Ok(Some(updated))
    }

    /// Resolves effective ownership for `path`.
    ///
    /// Walks from the path through successively shorter ancestors; for each
    /// role the nearest definition wins. Roles nobody defines fall back to the
    /// owning domain.
    ///
    /// # Errors
    ///
    /// Returns an error if a lock is poisoned.
    pub fn resolve_ownership(
        &self,
        path: &str,
        domains: &DomainRegistry,
    ) -> Result<ResolvedOwnership> {
        let domain = domains.domain_for_path(path)?;
        let state = self.state.read().map_err(poison_err)?;
        Ok(ResolvedOwnership::resolve(
            state.ownership_chain(path),
            domain.as_ref(),
        ))
    }

    /// Returns `path` and its ancestors, nearest first, with the node
    /// registered at each (if any).
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn ancestor_chain(&self, path: &str) -> Result<Vec<(String, Option<CatalogNode>)>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(std::iter::once(path)
            .chain(ancestor_paths(path))
            .map(|p| (p.to_string(), state.nodes.get(p).cloned()))
            .collect())
    }

    /// Finds the node whose source binding serves `path`.
    ///
    /// Walks from the path up through its ancestors and returns the first
    /// resolvable node with a binding. Nodes that are not resolvable (draft,
    /// pending review, approved-but-inactive, archived) are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn find_source_binding(&self, path: &str) -> Result<Option<BindingMatch>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(std::iter::once(path)
            .chain(ancestor_paths(path))
            .filter_map(|p| state.nodes.get(p))
            .find(|node| node.is_leaf() && node.status.is_resolvable())
            .map(|node| BindingMatch {
                binding_path: node.path.clone(),
                node: node.clone(),
            }))
    }

    /// Builds a nested tree under `root` (`""` for the whole catalog), at most
    /// `max_depth` levels deep.
    ///
    /// Returns `None` if `root` is neither registered nor a parent of any
    /// registered path.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn tree(&self, root: &str, max_depth: usize) -> Result<Option<CatalogTree>> {
        let state = self.state.read().map_err(poison_err)?;
        if !root.is_empty() && !state.nodes.contains_key(root) && !state.children.contains_key(root)
        {
            return Ok(None);
        }
        Ok(Some(state.tree(root, max_depth)))
    }

    /// Appends an entry to the audit log.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn add_audit_entry(&self, entry: AuditEntry) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.audit.push(entry);
        Ok(())
    }

    /// Returns audit entries in append order, optionally restricted to one
    /// path and to the most recent `limit` entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn audit_log(&self, path: Option<&str>, limit: Option<usize>) -> Result<Vec<AuditEntry>> {
        let state = self.state.read().map_err(poison_err)?;
        let matching: Vec<&AuditEntry> = state
            .audit
            .iter()
            .filter(|entry| path.is_none_or(|p| entry.path == p))
            .collect();
        let skip = limit.map_or(0, |limit| matching.len().saturating_sub(limit));
        Ok(matching.into_iter().skip(skip).cloned().collect())
    }

    /// Writes nodes and audit entries under a single write guard.
    pub(crate) fn commit(&self, nodes: Vec<CatalogNode>, entries: Vec<AuditEntry>) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        for node in nodes {
            state.insert(node);
        }
        state.audit.extend(entries);
        metrics::record_node_count(state.nodes.len());
        Ok(())
    }
}

fn canonicalize(nodes: impl IntoIterator<Item = CatalogNode>) -> Result<Vec<CatalogNode>> {
    nodes
        .into_iter()
        .map(checked)
        .collect()
}

fn checked(mut node: CatalogNode) -> Result<CatalogNode> {
    node.path = validate_path(&node.path)?;
    if let Some(policy) = &node.access_policy {
        policy.validate()?;
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{SourceBinding, SourceType};
    use crate::ownership::OwnershipRole;

    fn leaf(path: &str) -> CatalogNode {
        CatalogNode::new(path).with_binding(SourceBinding::new(SourceType::Snowflake))
    }

    #[test]
    fn register_then_get_returns_equal_node() {
        let registry = CatalogRegistry::new();
        let node = leaf("prices.equity").with_display_name("Equity prices");
        registry.register(node.clone()).unwrap();
        assert_eq!(registry.get("prices.equity").unwrap(), Some(node));
        assert!(registry.exists("prices.equity").unwrap());
        assert!(!registry.exists("prices").unwrap());
    }

    #[test]
    fn register_overwrites_and_is_idempotent() {
        let registry = CatalogRegistry::new();
        registry.register(CatalogNode::new("risk")).unwrap();
        registry
            .register(CatalogNode::new("risk").with_display_name("Risk"))
            .unwrap();
        registry
            .register(CatalogNode::new("risk").with_display_name("Risk"))
            .unwrap();
        assert_eq!(registry.len().unwrap(), 1);
        assert_eq!(registry.get("risk").unwrap().unwrap().display_name, "Risk");
        assert_eq!(registry.children_paths("").unwrap(), vec!["risk"]);
    }

    #[test]
    fn register_rejects_invalid_path() {
        let registry = CatalogRegistry::new();
        assert!(registry.register(CatalogNode::new("risk//cvar")).is_err());
        assert!(registry.register(CatalogNode::new("")).is_err());
        assert!(registry.is_empty().unwrap());
    }

    #[test]
    fn children_follow_both_separators() {
        let registry = CatalogRegistry::new();
        for path in ["risk", "risk.cvar", "risk/var", "risk.cvar/desk", "prices"] {
            registry.register(CatalogNode::new(path)).unwrap();
        }
        assert_eq!(registry.children_paths("").unwrap(), vec!["prices", "risk"]);
        assert_eq!(
            registry.children_paths("risk").unwrap(),
            vec!["risk.cvar", "risk/var"]
        );
        assert_eq!(
            registry.children_paths("risk.cvar").unwrap(),
            vec!["risk.cvar/desk"]
        );
        assert!(registry.children_paths("prices").unwrap().is_empty());
    }

    #[test]
    fn search_is_case_insensitive_ordered_and_limited() {
        let registry = CatalogRegistry::new();
        registry
            .register(CatalogNode::new("b.equity").with_display_name("Equity B"))
            .unwrap();
        registry
            .register(CatalogNode::new("a.rates").with_description("Not EQUITY related"))
            .unwrap();
        registry
            .register(CatalogNode::new("c.fx").with_tags(["equity-linked"]))
            .unwrap();
        registry.register(CatalogNode::new("d.credit")).unwrap();

        let paths: Vec<_> = registry
            .search("Equity", None, 10)
            .unwrap()
            .into_iter()
            .map(|n| n.path)
            .collect();
        assert_eq!(paths, vec!["a.rates", "b.equity", "c.fx"]);
        assert_eq!(registry.search("equity", None, 2).unwrap().len(), 2);
        assert!(registry.search("equity", None, 0).unwrap().is_empty());
    }

    #[test]
    fn search_filters_by_status() {
        let registry = CatalogRegistry::new();
        registry
            .register(CatalogNode::new("risk.cvar").with_tags(["risk"]))
            .unwrap();
        registry
            .register(
                CatalogNode::new("risk.legacy")
                    .with_tags(["risk"])
                    .with_status(NodeStatus::Deprecated),
            )
            .unwrap();

        let paths = |status: Option<NodeStatus>| -> Vec<String> {
            registry
                .search("risk", status, 10)
                .unwrap()
                .into_iter()
                .map(|n| n.path)
                .collect()
        };
        assert_eq!(paths(None), vec!["risk.cvar", "risk.legacy"]);
        assert_eq!(paths(Some(NodeStatus::Deprecated)), vec!["risk.legacy"]);
        assert!(paths(Some(NodeStatus::Draft)).is_empty());
    }

    #[test]
    fn register_rejects_uncompilable_access_policy() {
        let registry = CatalogRegistry::new();
        let node = CatalogNode::new("risk.cvar").with_access_policy(crate::AccessPolicy {
            blocked_patterns: vec!["(".to_string()],
            ..crate::AccessPolicy::default()
        });
        assert!(registry.register(node.clone()).is_err());
        assert!(registry.register_all([node]).is_err());
        assert!(registry.is_empty().unwrap());
    }

    #[test]
    fn count_includes_every_status() {
        let registry = CatalogRegistry::new();
        registry.register(CatalogNode::new("a")).unwrap();
        registry
            .register(CatalogNode::new("b").with_status(NodeStatus::Draft))
            .unwrap();
        let counts = registry.count().unwrap();
        assert_eq!(counts.len(), NodeStatus::ALL.len());
        assert_eq!(counts[&NodeStatus::Active], 1);
        assert_eq!(counts[&NodeStatus::Draft], 1);
        assert_eq!(counts[&NodeStatus::Archived], 0);
    }

    #[test]
    fn update_status_audits_and_reports_absence() {
        let registry = CatalogRegistry::new();
        registry.register(CatalogNode::new("risk")).unwrap();

        assert!(registry
            .update_status("missing", NodeStatus::Archived, "alice")
            .unwrap()
            .is_none());
        let updated = registry
            .update_status("risk", NodeStatus::Deprecated, "alice")
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, NodeStatus::Deprecated);
        assert!(updated.updated_at.is_some());

        let log = registry.audit_log(Some("risk"), None).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, AuditAction::StatusChanged);
        assert_eq!(log[0].old_value.as_deref(), Some("active"));
        assert_eq!(log[0].new_value.as_deref(), Some("deprecated"));
        assert_eq!(log[0].actor, "alice");
    }

    #[test]
    fn ownership_resolves_nearest_ancestor() {
        let registry = CatalogRegistry::new();
        let domains = DomainRegistry::new();
        registry
            .register(CatalogNode::new("risk").with_ownership(
                Ownership::new().with(OwnershipRole::AccountableOwner, "alice"),
            ))
            .unwrap();
        registry
            .register(CatalogNode::new("risk.cvar/desk").with_ownership(
                Ownership::new().with(OwnershipRole::SupportChannel, "#desk"),
            ))
            .unwrap();

        let resolved = registry
            .resolve_ownership("risk.cvar/desk", &domains)
            .unwrap();
        assert_eq!(resolved.value(OwnershipRole::AccountableOwner), Some("alice"));
        assert_eq!(resolved.value(OwnershipRole::SupportChannel), Some("#desk"));
        assert!(resolved.get(OwnershipRole::DataSpecialist).is_none());
    }

    #[test]
    fn binding_lookup_walks_ancestors_and_skips_unresolvable() {
        let registry = CatalogRegistry::new();
        registry.register(leaf("prices.equity")).unwrap();
        registry
            .register(leaf("prices.equity/AAPL").with_status(NodeStatus::PendingReview))
            .unwrap();

        let found = registry
            .find_source_binding("prices.equity/AAPL/close")
            .unwrap()
            .unwrap();
        assert_eq!(found.binding_path, "prices.equity");
        assert!(registry.find_source_binding("rates/swaps").unwrap().is_none());
    }

    #[test]
    fn audit_log_keeps_append_order_and_limits_to_recent() {
        let registry = CatalogRegistry::new();
        for actor in ["a", "b", "c"] {
            registry
                .add_audit_entry(AuditEntry::new("risk", AuditAction::MetadataUpdated, actor))
                .unwrap();
        }
        let actors: Vec<_> = registry
            .audit_log(None, Some(2))
            .unwrap()
            .into_iter()
            .map(|e| e.actor)
            .collect();
        assert_eq!(actors, vec!["b", "c"]);
    }

    #[test]
    fn replace_all_swaps_nodes_and_keeps_audit() {
        let registry = CatalogRegistry::new();
        registry.register(CatalogNode::new("old")).unwrap();
        registry
            .update_status("old", NodeStatus::Archived, "alice")
            .unwrap();

        let count = registry
            .replace_all([CatalogNode::new("new"), CatalogNode::new("new.child")])
            .unwrap();
        assert_eq!(count, 2);
        assert!(!registry.exists("old").unwrap());
        assert_eq!(registry.children_paths("new").unwrap(), vec!["new.child"]);
        let log = registry.audit_log(None, None).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].action, AuditAction::CatalogReloaded);
    }

    #[test]
    fn replace_all_is_all_or_nothing() {
        let registry = CatalogRegistry::new();
        registry.register(CatalogNode::new("keep")).unwrap();
        assert!(registry
            .replace_all([CatalogNode::new("ok"), CatalogNode::new("bad//path")])
            .is_err());
        assert!(registry.exists("keep").unwrap());
    }

    #[test]
    fn tree_respects_depth() {
        let registry = CatalogRegistry::new();
        for path in ["risk", "risk.cvar", "risk.cvar/desk"] {
            registry.register(CatalogNode::new(path)).unwrap();
        }
        let tree = registry.tree("", 2).unwrap().unwrap();
        assert_eq!(tree.children.len(), 1);
        let risk = &tree.children[0];
        assert_eq!(risk.path, "risk");
        assert_eq!(risk.children[0].path, "risk.cvar");
        assert!(risk.children[0].children.is_empty());
        assert!(registry.tree("nope", 3).unwrap().is_none());
    }

    #[test]
    fn metadata_patch_merges() {
        let registry = CatalogRegistry::new();
        let mut node = CatalogNode::new("risk");
        node.metadata.insert("legacy".to_string(), Value::from(1));
        registry.register(node).unwrap();

        let mut patch = NodePatch {
            description: Some("Risk analytics".to_string()),
            ..NodePatch::default()
        };
        patch.metadata.insert("legacy".to_string(), Value::Null);
        patch.metadata.insert("tier".to_string(), Value::from("gold"));
        let updated = registry
            .update_metadata("risk", &patch, "bob")
            .unwrap()
            .unwrap();
        assert_eq!(updated.description, "Risk analytics");
        assert!(!updated.metadata.contains_key("legacy"));
        assert_eq!(updated.metadata["tier"], "gold");
        let log = registry.audit_log(Some("risk"), None).unwrap();
        assert_eq!(log[0].details, "fields: description, metadata");
    }

    #[test]
    fn stats_count_leaves_by_source() {
        let registry = CatalogRegistry::new();
        registry.register(CatalogNode::new("prices")).unwrap();
        registry.register(leaf("prices.equity")).unwrap();
        registry.register(leaf("prices.fx")).unwrap();
        let stats = registry.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.leaves, 2);
        assert_eq!(stats.by_source_type[&SourceType::Snowflake], 2);
    }
}
