//! Result shapes returned by [`ResolutionService`](crate::ResolutionService).

use std::collections::BTreeMap;

use moniker_cache::QueryResult;
use moniker_catalog::node::{DataQuality, DataSchema, Documentation, Freshness, Sla};
use moniker_catalog::{
    BusinessModel, CatalogNode, NodeStatus, OwnershipRole, ResolvedOwnership, SourceType,
};
use serde::Serialize;
use serde_json::Value;

use crate::adapter::FetchRequest;

/// Who is calling. Opaque to the service; recorded on access events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallerIdentity {
    /// End-user identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Calling service identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    /// Calling application identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
}

impl CallerIdentity {
    /// An identity with only a user id.
    #[must_use]
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// Returns the most specific identifier, or `anonymous`.
    #[must_use]
    pub fn principal(&self) -> &str {
        self.user_id
            .as_deref()
            .or(self.service_id.as_deref())
            .or(self.app_id.as_deref())
            .unwrap_or("anonymous")
    }
}

/// A moniker resolved to its physical source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolveResult {
    /// Canonical moniker.
    pub moniker: String,
    /// Canonical catalog path of the moniker.
    pub path: String,
    /// Path of the node whose binding serves the moniker.
    pub binding_path: String,
    /// Source system kind.
    pub source_type: SourceType,
    /// Connection parameters (binding config minus the query).
    pub connection: BTreeMap<String, Value>,
    /// Rendered query, if the binding declares a template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Query-string parameters carried by the moniker.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    /// Declared result schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    /// Whether the source is read-only.
    pub read_only: bool,
    /// Ownership resolved through the hierarchy.
    pub ownership: ResolvedOwnership,
    /// Filter segments left after the binding path.
    pub filters: Vec<String>,
    /// Names of the binding's filter positions.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub segment_labels: Vec<String>,
    /// Binding path of the deprecated node this result was redirected from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirected_from: Option<String>,
    /// Set when the serving node is deprecated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecation_message: Option<String>,
    /// Set when the access policy allowed a large query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_warning: Option<String>,
    /// Row estimate from the access policy, when one applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_rows: Option<u64>,
    /// Fingerprint of the binding contract.
    pub binding_fingerprint: String,
}

impl ResolveResult {
    /// Builds the adapter request for this resolution.
    #[must_use]
    pub fn fetch_request(&self) -> FetchRequest {
        let labels = self
            .segment_labels
            .iter()
            .zip(&self.filters)
            .map(|(label, value)| (label.clone(), value.clone()))
            .collect();
        FetchRequest {
            moniker: self.moniker.clone(),
            binding_path: self.binding_path.clone(),
            source_type: self.source_type,
            connection: self.connection.clone(),
            query: self.query.clone(),
            filters: self.filters.clone(),
            labels,
        }
    }
}

/// Layer that served a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchSource {
    /// The background-refreshed cached query.
    CachedQuery,
    /// The local result cache.
    LocalCache,
    /// A live adapter call.
    Adapter,
}

impl FetchSource {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CachedQuery => "cached_query",
            Self::LocalCache => "local_cache",
            Self::Adapter => "adapter",
        }
    }
}

/// Rows fetched for a moniker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResult {
    /// Canonical moniker.
    pub moniker: String,
    /// Path of the binding node.
    pub binding_path: String,
    /// Layer that served the rows.
    pub source: FetchSource,
    /// True when a cached query served a value past its TTL or after a
    /// failed refresh.
    pub stale: bool,
    /// The rows.
    pub result: QueryResult,
}

/// Metadata about a catalog path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescribeResult {
    /// Canonical path.
    pub path: String,
    /// `moniker://` form of the path.
    pub moniker: String,
    /// Node registered at the path, if any.
    pub node: Option<CatalogNode>,
    /// Whether a binding serves the path.
    pub has_source_binding: bool,
    /// Source type of that binding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type: Option<SourceType>,
    /// Path of that binding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding_path: Option<String>,
    /// Fingerprint of that binding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding_fingerprint: Option<String>,
    /// Ownership resolved through the hierarchy.
    pub ownership: ResolvedOwnership,
    /// Data schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<DataSchema>,
    /// Data-quality information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_quality: Option<DataQuality>,
    /// Service-level agreement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sla: Option<Sla>,
    /// Freshness information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freshness: Option<Freshness>,
    /// Documentation links.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<Documentation>,
    /// Business models that appear in this path.
    pub related_models: Vec<BusinessModel>,
}

/// Children of a catalog path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListResult {
    /// The listed path (`""` for the root).
    pub path: String,
    /// Child path suffixes, sorted.
    pub children: Vec<String>,
    /// Ownership resolved for the listed path.
    pub ownership: ResolvedOwnership,
}

/// One level of a lineage chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineageLevel {
    /// Path of this level.
    pub path: String,
    /// Whether a node is registered here.
    pub registered: bool,
    /// Status of that node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<NodeStatus>,
    /// Ownership roles this level defines itself.
    pub defined_roles: Vec<OwnershipRole>,
}

/// Ancestor chain of a path with ownership provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineageResult {
    /// Canonical path.
    pub path: String,
    /// The path and its ancestors, nearest first.
    pub levels: Vec<LineageLevel>,
    /// Ownership resolved with provenance.
    pub ownership: ResolvedOwnership,
}
