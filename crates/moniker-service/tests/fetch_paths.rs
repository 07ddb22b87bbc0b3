//! Fetch dispatch: cached queries, the local result cache, and live adapters.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use moniker_cache::QueryResult;
use moniker_catalog::{CatalogNode, CatalogRegistry, SourceBinding, SourceType};
use moniker_core::CachePolicy;
use moniker_service::prelude::*;
use moniker_service::{AdapterError, register_cached_queries};
use serde_json::json;

fn caller() -> CallerIdentity {
    CallerIdentity::user("analyst@firm.com")
}

fn currencies() -> CatalogNode {
    CatalogNode::new("refdata.currencies").with_binding(
        SourceBinding::new(SourceType::Static)
            .with_config(
                "data",
                json!([
                    {"ccy": "USD", "name": "US Dollar"},
                    {"ccy": "EUR", "name": "Euro"},
                ]),
            )
            .with_segment_labels(["ccy"]),
    )
}

/// Counts calls and answers after a configurable delay.
struct CountingAdapter {
    calls: Arc<AtomicUsize>,
    delay: Duration,
}

#[async_trait]
impl SourceAdapter for CountingAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Rest
    }

    async fn fetch(&self, request: &FetchRequest) -> std::result::Result<QueryResult, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(QueryResult::from_rows(vec![
            json!({"filters": request.filters.join("/")}),
        ]))
    }
}

fn rest_service(delay: Duration, timeout: Duration) -> (ResolutionService, Arc<AtomicUsize>) {
    let catalog = Arc::new(CatalogRegistry::new());
    catalog
        .register(
            CatalogNode::new("rates.curves").with_binding(
                SourceBinding::new(SourceType::Rest).with_config("url", "http://curves"),
            ),
        )
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let adapters = AdapterRegistry::with_defaults().with_adapter(Arc::new(CountingAdapter {
        calls: Arc::clone(&calls),
        delay,
    }));
    let config = ServiceConfig {
        fetch_timeout: timeout,
        ..ServiceConfig::default()
    };
    let service = ResolutionService::new(catalog, config).with_adapters(Arc::new(adapters));
    (service, calls)
}

#[tokio::test]
async fn static_rows_are_filtered_then_served_locally() {
    let catalog = Arc::new(CatalogRegistry::new());
    catalog.register(currencies()).unwrap();
    let service = ResolutionService::new(catalog, ServiceConfig::default());

    let first = service.fetch("refdata.currencies/EUR", &caller()).await.unwrap();
    assert_eq!(first.source, FetchSource::Adapter);
    assert_eq!(first.result.rows, vec![json!({"ccy": "EUR", "name": "Euro"})]);

    let second = service.fetch("refdata.currencies/EUR", &caller()).await.unwrap();
    assert_eq!(second.source, FetchSource::LocalCache);
    assert_eq!(second.result, first.result);

    let all = service.fetch("refdata.currencies", &caller()).await.unwrap();
    assert_eq!(all.result.row_count(), 2);
}

#[tokio::test]
async fn cached_query_serves_unfiltered_fetches() {
    let catalog = Arc::new(CatalogRegistry::new());
    let mut node = currencies();
    if let Some(binding) = node.source_binding.as_mut() {
        binding.cache = Some(CachePolicy::enabled(300, 60));
    }
    catalog.register(node).unwrap();
    let service = ResolutionService::new(catalog, ServiceConfig::default());
    let adapters = Arc::new(AdapterRegistry::with_defaults());
    register_cached_queries(service.catalog(), service.queries(), &adapters).unwrap();

    let err = service.fetch("refdata.currencies", &caller()).await.unwrap_err();
    assert_eq!(err.code(), "UNAVAILABLE");

    let startup = service.queries().refresh_all_startup().await;
    assert_eq!(startup.get("refdata.currencies"), Some(&true));

    let fetched = service.fetch("refdata.currencies", &caller()).await.unwrap();
    assert_eq!(fetched.source, FetchSource::CachedQuery);
    assert!(!fetched.stale);
    assert_eq!(fetched.result.row_count(), 2);

    // Filtered fetches bypass the cached query.
    let filtered = service.fetch("refdata.currencies/USD", &caller()).await.unwrap();
    assert_eq!(filtered.source, FetchSource::Adapter);
    assert_eq!(filtered.result.row_count(), 1);
}

#[tokio::test]
async fn dated_or_parameterised_fetches_bypass_the_cached_query() {
    let catalog = Arc::new(CatalogRegistry::new());
    let mut node = currencies();
    if let Some(binding) = node.source_binding.as_mut() {
        binding.cache = Some(CachePolicy::enabled(300, 60));
    }
    catalog.register(node).unwrap();
    let service = ResolutionService::new(catalog, ServiceConfig::default());
    let adapters = Arc::new(AdapterRegistry::with_defaults());
    register_cached_queries(service.catalog(), service.queries(), &adapters).unwrap();
    service.queries().refresh_all_startup().await;

    let dated = service
        .fetch("refdata.currencies@20240101", &caller())
        .await
        .unwrap();
    assert_eq!(dated.source, FetchSource::Adapter);

    let with_params = service
        .fetch("refdata.currencies?format=csv", &caller())
        .await
        .unwrap();
    assert_eq!(with_params.source, FetchSource::Adapter);

    let latest = service
        .fetch("refdata.currencies@latest", &caller())
        .await
        .unwrap();
    assert_eq!(latest.source, FetchSource::CachedQuery);
}

#[tokio::test(start_paused = true)]
async fn slow_adapter_times_out_as_unavailable() {
    let (service, calls) = rest_service(Duration::from_secs(60), Duration::from_secs(1));

    let err = service.fetch("rates.curves/USD", &caller()).await.unwrap_err();
    assert_eq!(err.code(), "UNAVAILABLE");
    assert!(err.to_string().contains("timed out"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn adapter_receives_remaining_filters() {
    let (service, calls) = rest_service(Duration::ZERO, Duration::from_secs(5));

    let fetched = service.fetch("rates.curves/USD/3M", &caller()).await.unwrap();
    assert_eq!(fetched.result.rows, vec![json!({"filters": "USD/3M"})]);

    service.fetch("rates.curves/USD/3M", &caller()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unsupported_source_type_is_unavailable() {
    let catalog = Arc::new(CatalogRegistry::new());
    catalog
        .register(
            CatalogNode::new("risk.cvar").with_binding(SourceBinding::new(SourceType::Snowflake)),
        )
        .unwrap();
    let service = ResolutionService::new(catalog, ServiceConfig::default());

    let err = service.fetch("risk.cvar", &caller()).await.unwrap_err();
    assert_eq!(err.code(), "UNAVAILABLE");
    assert!(err.to_string().contains("snowflake"));
}
