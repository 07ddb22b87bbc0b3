//! Catalog node model.
//!
//! A [`CatalogNode`] is keyed by its canonical path. Nodes without a
//! [`SourceBinding`] are categories that aggregate their children; nodes with
//! one are leaves that resolve to a physical source.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use moniker_core::CachePolicy;

use crate::access::AccessPolicy;
use crate::error::CatalogError;
use crate::ownership::Ownership;

/// Config key holding the query template; excluded from connection params.
pub const QUERY_CONFIG_KEY: &str = "query";

/// Default governance classification for loaded nodes.
pub const DEFAULT_CLASSIFICATION: &str = "internal";

/// Lifecycle status of a catalog node.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Not yet submitted, or returned after rejection.
    Draft,
    /// Submitted and awaiting review; reserves the path.
    PendingReview,
    /// Approved but not yet activated.
    Approved,
    /// Live and resolvable.
    #[default]
    Active,
    /// Still resolvable, but callers should migrate to the successor.
    Deprecated,
    /// Retired; kept for history, never resolved.
    Archived,
}

impl NodeStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Draft,
        Self::PendingReview,
        Self::Approved,
        Self::Active,
        Self::Deprecated,
        Self::Archived,
    ];

    /// Returns the wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingReview => "pending_review",
            Self::Approved => "approved",
            Self::Active => "active",
            Self::Deprecated => "deprecated",
            Self::Archived => "archived",
        }
    }

    /// Returns true if a node in this status may serve resolve calls.
    #[must_use]
    pub const fn is_resolvable(self) -> bool {
        matches!(self, Self::Active | Self::Deprecated)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| {
                CatalogError::validation(format!(
                    "unknown node status '{s}' (expected one of: {})",
                    Self::ALL.map(Self::as_str).join(", ")
                ))
            })
    }
}

/// Kind of system backing a source binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Snowflake warehouse.
    Snowflake,
    /// Oracle database.
    Oracle,
    /// Microsoft SQL Server.
    Mssql,
    /// HTTP/REST endpoint.
    Rest,
    /// Inline rows declared in the binding itself.
    Static,
    /// Spreadsheet.
    Excel,
    /// Bloomberg market data.
    Bloomberg,
    /// Refinitiv market data.
    Refinitiv,
    /// `OpenSearch` index.
    Opensearch,
    /// Combination of other bindings.
    Composite,
    /// Computed from other monikers.
    Derived,
}

impl SourceType {
    /// Every source type.
    pub const ALL: [Self; 11] = [
        Self::Snowflake,
        Self::Oracle,
        Self::Mssql,
        Self::Rest,
        Self::Static,
        Self::Excel,
        Self::Bloomberg,
        Self::Refinitiv,
        Self::Opensearch,
        Self::Composite,
        Self::Derived,
    ];

    /// Returns the wire name of the source type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Snowflake => "snowflake",
            Self::Oracle => "oracle",
            Self::Mssql => "mssql",
            Self::Rest => "rest",
            Self::Static => "static",
            Self::Excel => "excel",
            Self::Bloomberg => "bloomberg",
            Self::Refinitiv => "refinitiv",
            Self::Opensearch => "opensearch",
            Self::Composite => "composite",
            Self::Derived => "derived",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|source| source.as_str() == normalized)
            .ok_or_else(|| CatalogError::validation(format!("unknown source type '{s}'")))
    }
}

/// Mapping from a catalog node to a physical source and its fetch parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceBinding {
    /// Backing system.
    #[serde(rename = "type", alias = "source_type")]
    pub source_type: SourceType,
    /// Source-specific configuration; opaque to the catalog.
    #[serde(default)]
    pub config: BTreeMap<String, Value>,
    /// Operations callers may perform against the source.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_operations: Vec<String>,
    /// Optional schema description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    /// What each filter position means, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segment_labels: Vec<String>,
    /// Whether the source is read-only.
    #[serde(default = "default_read_only")]
    pub read_only: bool,
    /// Optional background-refresh cache policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CachePolicy>,
}

fn default_read_only() -> bool {
    true
}

impl SourceBinding {
    /// Creates a read-only binding with an empty config.
    #[must_use]
    pub fn new(source_type: SourceType) -> Self {
        Self {
            source_type,
            config: BTreeMap::new(),
            allowed_operations: Vec::new(),
            schema: None,
            segment_labels: Vec::new(),
            read_only: true,
            cache: None,
        }
    }

    /// Adds a config entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Declares the filter segment labels.
    #[must_use]
    pub fn with_segment_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.segment_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the cache policy.
    #[must_use]
    pub fn with_cache(mut self, policy: CachePolicy) -> Self {
        self.cache = Some(policy);
        self
    }

    /// Returns the query template, if the binding declares one.
    #[must_use]
    pub fn query_template(&self) -> Option<&str> {
        self.config.get(QUERY_CONFIG_KEY).and_then(Value::as_str)
    }

    /// Returns the config entries other than the query template.
    #[must_use]
    pub fn connection_params(&self) -> BTreeMap<String, Value> {
        self.config
            .iter()
            .filter(|(key, _)| key.as_str() != QUERY_CONFIG_KEY)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Returns the cache policy when caching is enabled.
    #[must_use]
    pub fn enabled_cache(&self) -> Option<&CachePolicy> {
        self.cache.as_ref().filter(|policy| policy.enabled)
    }

    /// Returns a short, stable fingerprint of the binding contract.
    ///
    /// The fingerprint covers source type, config, allowed operations, schema
    /// and the read-only flag: the first 16 hex characters of their SHA-256.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let contract = serde_json::json!({
            "source_type": self.source_type.as_str(),
            "config": self.config,
            "allowed_operations": self.allowed_operations,
            "schema": self.schema,
            "read_only": self.read_only,
        });
        let digest = Sha256::digest(contract.to_string().as_bytes());
        digest[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Data-quality information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    /// Person or team accountable for quality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dq_owner: Option<String>,
    /// Quality score, typically 0-100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    /// Rules the data is validated against.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_rules: Vec<String>,
    /// Known open issues.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub known_issues: Vec<String>,
    /// Last validation time (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_validated: Option<String>,
}

/// Service level agreement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sla {
    /// Freshness commitment, e.g. "T+1 by 07:00 UTC".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freshness: Option<String>,
    /// Availability commitment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<String>,
    /// Supported hours.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_hours: Option<String>,
    /// Escalation contact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_contact: Option<String>,
}

/// Load-time freshness information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Freshness {
    /// Last load time (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_loaded: Option<String>,
    /// Load schedule, e.g. a cron expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_schedule: Option<String>,
    /// Upstream system of record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_system: Option<String>,
    /// Monikers this data depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upstream_dependencies: Vec<String>,
}

/// A single column description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name.
    pub name: String,
    /// Logical data type (`string`, `float`, `date`, ...).
    #[serde(default, alias = "type")]
    pub data_type: String,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Semantic role (`identifier`, `measure`, `dimension`, `timestamp`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_type: Option<String>,
    /// Example value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    /// Whether the column is part of the primary key.
    #[serde(default)]
    pub primary_key: bool,
}

/// Machine-readable schema for a leaf node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSchema {
    /// What the dataset contains.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Column definitions.
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
    /// Row grain, e.g. "one row per security per day".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granularity: Option<String>,
    /// Typical row count, as a human hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typical_row_count: Option<String>,
    /// Primary key columns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
    /// Typical use cases.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub use_cases: Vec<String>,
    /// Related monikers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_monikers: Vec<String>,
}

/// Links to governance documentation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Documentation {
    /// Business glossary entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glossary: Option<String>,
    /// Operational runbook.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runbook: Option<String>,
    /// Onboarding guide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboarding: Option<String>,
    /// Data dictionary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dictionary: Option<String>,
    /// Other named links.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_links: BTreeMap<String, String>,
}

/// A node in the catalog hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogNode {
    /// Canonical path; unique in the registry.
    #[serde(default)]
    pub path: String,
    /// Human-readable name.
    #[serde(default)]
    pub display_name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Governance sensitivity label.
    #[serde(default = "default_classification")]
    pub classification: String,
    /// Unordered tags.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    /// Arbitrary opaque metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    /// Lifecycle status.
    #[serde(default)]
    pub status: NodeStatus,
    /// Path that replaces this node once deprecated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successor: Option<String>,
    /// Message shown to callers of a deprecated node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecation_message: Option<String>,
    /// Ownership roles defined at this node (others inherit).
    #[serde(default, skip_serializing_if = "Ownership::is_empty")]
    pub ownership: Ownership,
    /// Physical source; present iff the node is a leaf.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_binding: Option<SourceBinding>,
    /// Data-quality record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_quality: Option<DataQuality>,
    /// Service level agreement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla: Option<Sla>,
    /// Freshness record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freshness: Option<Freshness>,
    /// Column-level schema.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "schema")]
    pub data_schema: Option<DataSchema>,
    /// Query-pattern access policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_policy: Option<AccessPolicy>,
    /// Documentation links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<Documentation>,
    /// First registration time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last mutation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_classification() -> String {
    DEFAULT_CLASSIFICATION.to_string()
}

impl CatalogNode {
    /// Creates an active category node at `path`.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            display_name: String::new(),
            description: String::new(),
            classification: default_classification(),
            tags: BTreeSet::new(),
            metadata: BTreeMap::new(),
            status: NodeStatus::Active,
            successor: None,
            deprecation_message: None,
            ownership: Ownership::default(),
            source_binding: None,
            data_quality: None,
            sla: None,
            freshness: None,
            data_schema: None,
            access_policy: None,
            documentation: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the lifecycle status.
    #[must_use]
    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the ownership defined at this node.
    #[must_use]
    pub fn with_ownership(mut self, ownership: Ownership) -> Self {
        self.ownership = ownership;
        self
    }

    /// Attaches a source binding, making the node a leaf.
    #[must_use]
    pub fn with_binding(mut self, binding: SourceBinding) -> Self {
        self.source_binding = Some(binding);
        self
    }

    /// Adds tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Attaches an access policy.
    #[must_use]
    pub fn with_access_policy(mut self, policy: AccessPolicy) -> Self {
        self.access_policy = Some(policy);
        self
    }

    /// Marks the node deprecated in favour of `successor`.
    #[must_use]
    pub fn deprecated_for(mut self, successor: impl Into<String>, message: impl Into<String>) -> Self {
        self.status = NodeStatus::Deprecated;
        self.successor = Some(successor.into());
        self.deprecation_message = Some(message.into());
        self
    }

    /// Returns true iff the node has a source binding.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.source_binding.is_some()
    }

    /// Returns true if `needle` (already lowercased) occurs in the path,
    /// display name, description or any tag.
    #[must_use]
    pub fn matches_text(&self, needle: &str) -> bool {
        self.path.to_lowercase().contains(needle)
            || self.display_name.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
            || self.tags.iter().any(|tag| tag.to_lowercase().contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Pending_Review".parse::<NodeStatus>().unwrap(), NodeStatus::PendingReview);
        assert_eq!(" active ".parse::<NodeStatus>().unwrap(), NodeStatus::Active);
        let err = "live".parse::<NodeStatus>().unwrap_err();
        assert!(err.to_string().contains("unknown node status"));
    }

    #[test]
    fn status_serde_is_snake_case() {
        let json = serde_json::to_string(&NodeStatus::PendingReview).unwrap();
        assert_eq!(json, "\"pending_review\"");
    }

    #[test]
    fn only_active_and_deprecated_resolve() {
        let resolvable: Vec<_> = NodeStatus::ALL
            .into_iter()
            .filter(|s| s.is_resolvable())
            .collect();
        assert_eq!(resolvable, vec![NodeStatus::Active, NodeStatus::Deprecated]);
    }

    #[test]
    fn source_type_roundtrip() {
        for source in SourceType::ALL {
            assert_eq!(source.as_str().parse::<SourceType>().unwrap(), source);
        }
        assert!("postgres".parse::<SourceType>().is_err());
    }

    #[test]
    fn binding_splits_query_from_connection() {
        let binding = SourceBinding::new(SourceType::Snowflake)
            .with_config("account", "acme")
            .with_config("query", "SELECT * FROM px WHERE ticker = '{segments[0]}'");
        assert_eq!(
            binding.query_template(),
            Some("SELECT * FROM px WHERE ticker = '{segments[0]}'")
        );
        let params = binding.connection_params();
        assert_eq!(params.len(), 1);
        assert!(params.contains_key("account"));
    }

    #[test]
    fn fingerprint_is_stable_and_contract_sensitive() {
        let a = SourceBinding::new(SourceType::Oracle).with_config("dsn", "db1");
        let b = SourceBinding::new(SourceType::Oracle).with_config("dsn", "db1");
        let c = SourceBinding::new(SourceType::Oracle).with_config("dsn", "db2");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 16);
        let cached = a.clone().with_cache(CachePolicy::enabled(60, 0));
        assert_eq!(a.fingerprint(), cached.fingerprint());
    }

    #[test]
    fn node_defaults_from_yaml() {
        let node: CatalogNode = serde_yaml::from_str(
            "display_name: Equity prices\nsource_binding:\n  type: snowflake\n  config:\n    table: PX\n",
        )
        .unwrap();
        assert_eq!(node.status, NodeStatus::Active);
        assert_eq!(node.classification, DEFAULT_CLASSIFICATION);
        assert!(node.is_leaf());
        let binding = node.source_binding.unwrap();
        assert!(binding.read_only);
        assert!(binding.enabled_cache().is_none());
    }

    #[test]
    fn text_match_covers_tags() {
        let node = CatalogNode::new("risk.cvar")
            .with_display_name("Conditional VaR")
            .with_tags(["Tail-Risk"]);
        assert!(node.matches_text("cvar"));
        assert!(node.matches_text("conditional"));
        assert!(node.matches_text("tail-risk"));
        assert!(!node.matches_text("equity"));
    }
}
