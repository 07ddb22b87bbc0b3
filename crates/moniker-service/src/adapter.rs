//! Source adapters.
//!
//! An adapter turns a resolved binding into rows from one kind of source
//! system. Only the interface lives here; real connectors register their own
//! implementation with the [`AdapterRegistry`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use moniker_cache::QueryResult;
use moniker_catalog::{SourceBinding, SourceType};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Config key holding inline rows for the static adapter.
pub const STATIC_DATA_KEY: &str = "data";

/// Errors raised by source adapters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    /// No adapter is registered for the source type.
    #[error("no adapter registered for source type '{source_type}'")]
    Unsupported {
        /// The unsupported source type.
        source_type: String,
    },

    /// The binding's config cannot drive this adapter.
    #[error("invalid binding config for {binding_path}: {message}")]
    Config {
        /// Path of the binding node.
        binding_path: String,
        /// Description of the problem.
        message: String,
    },

    /// The upstream source failed.
    #[error("upstream fetch failed for {binding_path}: {message}")]
    Upstream {
        /// Path of the binding node.
        binding_path: String,
        /// Description of the failure.
        message: String,
    },
}

/// Everything an adapter needs to fetch rows for one resolved moniker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchRequest {
    /// Canonical moniker being fetched.
    pub moniker: String,
    /// Path of the node carrying the binding.
    pub binding_path: String,
    /// Source system kind.
    pub source_type: SourceType,
    /// Connection parameters (binding config minus the query).
    pub connection: BTreeMap<String, Value>,
    /// Rendered query, if the binding declares one.
    pub query: Option<String>,
    /// Remaining filter segments, in order.
    pub filters: Vec<String>,
    /// Filter values keyed by their segment label.
    pub labels: BTreeMap<String, String>,
}

impl FetchRequest {
    /// Builds an unfiltered request straight from a binding.
    #[must_use]
    pub fn for_binding(binding_path: &str, binding: &SourceBinding) -> Self {
        Self {
            moniker: binding_path.to_string(),
            binding_path: binding_path.to_string(),
            source_type: binding.source_type,
            connection: binding.connection_params(),
            query: binding.query_template().map(str::to_string),
            filters: Vec::new(),
            labels: BTreeMap::new(),
        }
    }
}

/// Fetches rows from one kind of source system.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Source type this adapter serves.
    fn source_type(&self) -> SourceType;

    /// Fetches the rows described by `request`.
    async fn fetch(&self, request: &FetchRequest) -> Result<QueryResult, AdapterError>;
}

/// Maps source types to adapters.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<SourceType, Arc<dyn SourceAdapter>>,
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.adapters.keys().map(|t| t.as_str()).collect();
        types.sort_unstable();
        f.debug_struct("AdapterRegistry")
            .field("source_types", &types)
            .finish()
    }
}

impl AdapterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in adapters.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new().with_adapter(Arc::new(StaticAdapter))
    }

    /// Registers an adapter, replacing any previous one for its source type.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Registers an adapter, replacing any previous one for its source type.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.source_type(), adapter);
    }

    /// Returns the adapter for `source_type`.
    #[must_use]
    pub fn get(&self, source_type: SourceType) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&source_type).cloned()
    }

    /// Returns true if an adapter serves `source_type`.
    #[must_use]
    pub fn supports(&self, source_type: SourceType) -> bool {
        self.adapters.contains_key(&source_type)
    }

    /// Dispatches `request` to the adapter for its source type.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Unsupported`] if no adapter is registered, or
    /// the adapter's own error.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<QueryResult, AdapterError> {
        let adapter = self
            .get(request.source_type)
            .ok_or_else(|| AdapterError::Unsupported {
                source_type: request.source_type.as_str().to_string(),
            })?;
        adapter.fetch(request).await
    }
}

/// Serves rows declared inline in the binding's `data` config entry.
///
/// Rows are filtered by label: a row is kept when, for every labelled filter,
/// the row's field of that name renders to the filter value.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticAdapter;

#[async_trait]
impl SourceAdapter for StaticAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Static
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<QueryResult, AdapterError> {
        let rows = match request.connection.get(STATIC_DATA_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(rows)) => rows.clone(),
            Some(_) => {
                return Err(AdapterError::Config {
                    binding_path: request.binding_path.clone(),
                    message: format!("'{STATIC_DATA_KEY}' must be a list of rows"),
                });
            }
        };
        let rows = rows
            .into_iter()
            .filter(|row| {
                request
                    .labels
                    .iter()
                    .all(|(label, expected)| row.get(label).is_some_and(|v| field_eq(v, expected)))
            })
            .collect();
        Ok(QueryResult::from_rows(rows))
    }
}

fn field_eq(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s.eq_ignore_ascii_case(expected),
        Value::Number(n) => n.to_string() == expected,
        Value::Bool(b) => b.to_string() == expected,
        _ => false,
    }
}
