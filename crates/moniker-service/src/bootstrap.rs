//! Wiring between the catalog and the cached query manager.

use std::sync::Arc;

use moniker_cache::{CacheError, CachedQueryManager, query_fetcher};
use moniker_catalog::{CatalogNode, CatalogRegistry, NodeStatus};

use crate::adapter::{AdapterRegistry, FetchRequest};
use crate::error::Result;

/// Registers one cached query for every resolvable binding node whose
/// binding declares an enabled cache policy, skipping deprecated nodes that
/// redirect to a successor. Each query fetches through the
/// adapter for its source type.
///
/// Returns the number of queries registered.
///
/// # Errors
///
/// Returns an error if the catalog cannot be read.
pub fn register_cached_queries(
    catalog: &CatalogRegistry,
    queries: &CachedQueryManager,
    adapters: &Arc<AdapterRegistry>,
) -> Result<usize> {
    let mut registered = 0;
    for node in catalog.all_nodes()? {
        if register_node(&node, queries, adapters) {
            registered += 1;
        }
    }
    tracing::info!(queries = registered, "cached queries registered");
    Ok(registered)
}

/// Brings the cached query for `path` in line with its node after a
/// governed write.
///
/// A node that is no longer eligible loses its query, and one that became
/// eligible gains one. An already registered query keeps its value.
///
/// # Errors
///
/// Returns an error if the catalog cannot be read.
pub fn sync_cached_query(
    catalog: &CatalogRegistry,
    queries: &CachedQueryManager,
    adapters: &Arc<AdapterRegistry>,
    path: &str,
) -> Result<()> {
    let node = catalog.get(path)?;
    let eligible = node.as_ref().is_some_and(cache_eligible);
    match (eligible, queries.is_registered(path)) {
        (false, true) => {
            queries.unregister(path);
            tracing::info!(path, "cached query unregistered");
        }
        (true, false) => {
            if node
                .as_ref()
                .is_some_and(|node| register_node(node, queries, adapters))
            {
                tracing::info!(path, "cached query registered");
            }
        }
        _ => {}
    }
    Ok(())
}

/// Resolvable in its own right (not redirected to a successor) with an
/// enabled cache policy.
fn cache_eligible(node: &CatalogNode) -> bool {
    let redirected = node.status == NodeStatus::Deprecated && node.successor.is_some();
    node.status.is_resolvable()
        && !redirected
        && node
            .source_binding
            .as_ref()
            .is_some_and(|binding| binding.enabled_cache().is_some())
}

fn register_node(
    node: &CatalogNode,
    queries: &CachedQueryManager,
    adapters: &Arc<AdapterRegistry>,
) -> bool {
    if !cache_eligible(node) {
        return false;
    }
    let Some(binding) = node.source_binding.as_ref() else {
        return false;
    };
    let Some(policy) = binding.enabled_cache().cloned() else {
        return false;
    };
    if !adapters.supports(binding.source_type) {
        tracing::warn!(
            path = %node.path,
            source_type = binding.source_type.as_str(),
            "cache policy declared but no adapter serves this source type"
        );
    }

    let request = FetchRequest::for_binding(&node.path, binding);
    let adapters = Arc::clone(adapters);
    let fetcher = query_fetcher(move |path| {
        let adapters = Arc::clone(&adapters);
        let request = request.clone();
        async move {
            adapters
                .fetch(&request)
                .await
                .map_err(|e| CacheError::fetch_failed(path, e.to_string()))
        }
    });
    queries.register(node.path.clone(), policy, fetcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use moniker_cache::{QueryLookup, QueryManagerConfig};
    use moniker_catalog::{CatalogNode, NodeStatus, SourceBinding, SourceType};
    use moniker_core::CachePolicy;
    use serde_json::json;

    fn cached_binding() -> SourceBinding {
        SourceBinding::new(SourceType::Static)
            .with_config("data", json!([{"ccy": "USD"}, {"ccy": "EUR"}]))
            .with_cache(CachePolicy::enabled(60, 30))
    }

    #[tokio::test]
    async fn registers_only_enabled_resolvable_bindings() {
        let catalog = CatalogRegistry::new();
        catalog
            .register_all([
                CatalogNode::new("refdata.currencies").with_binding(cached_binding()),
                CatalogNode::new("refdata.draft")
                    .with_binding(cached_binding())
                    .with_status(NodeStatus::Draft),
                CatalogNode::new("refdata.uncached")
                    .with_binding(SourceBinding::new(SourceType::Static)),
            ])
            .unwrap();
        let queries = CachedQueryManager::new(QueryManagerConfig::default());
        let adapters = Arc::new(AdapterRegistry::with_defaults());

        let count = register_cached_queries(&catalog, &queries, &adapters).unwrap();
        assert_eq!(count, 1);
        assert_eq!(queries.paths(), vec!["refdata.currencies".to_string()]);

        assert!(queries.refresh("refdata.currencies").await.unwrap().is_success());
        let QueryLookup::Fresh(value) = queries.get("refdata.currencies").await.unwrap() else {
            panic!("expected a fresh value");
        };
        assert_eq!(value.result.row_count(), 2);
    }

    #[tokio::test]
    async fn sync_follows_status_changes() {
        let catalog = CatalogRegistry::new();
        catalog
            .register(CatalogNode::new("refdata.currencies").with_binding(cached_binding()))
            .unwrap();
        let queries = CachedQueryManager::new(QueryManagerConfig::default());
        let adapters = Arc::new(AdapterRegistry::with_defaults());
        register_cached_queries(&catalog, &queries, &adapters).unwrap();
        assert!(queries.refresh("refdata.currencies").await.unwrap().is_success());

        catalog
            .update_status("refdata.currencies", NodeStatus::Archived, "steward")
            .unwrap();
        sync_cached_query(&catalog, &queries, &adapters, "refdata.currencies").unwrap();
        assert!(queries.is_empty());

        catalog
            .update_status("refdata.currencies", NodeStatus::Active, "steward")
            .unwrap();
        sync_cached_query(&catalog, &queries, &adapters, "refdata.currencies").unwrap();
        assert!(queries.is_registered("refdata.currencies"));

        sync_cached_query(&catalog, &queries, &adapters, "refdata.missing").unwrap();
        assert_eq!(queries.len(), 1);
    }
}
