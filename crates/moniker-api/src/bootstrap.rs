//! Service assembly from configuration.

use std::sync::Arc;

use moniker_cache::CachedQueryManager;
use moniker_catalog::loader::{load_catalog_sources, load_domains_file, load_models_file};
use moniker_catalog::{CatalogRegistry, DomainRegistry, ModelRegistry};
use moniker_service::{AdapterRegistry, ResolutionService, Result, register_cached_queries};

use crate::config::Config;

/// Loads every configured document and assembles the resolution service.
///
/// Cached queries are registered but not yet refreshed; call
/// [`CachedQueryManager::refresh_all_startup`] before serving.
///
/// # Errors
///
/// Returns an error if any catalog, domain or model document fails to load.
pub fn build_service(config: &Config) -> Result<ResolutionService> {
    let catalog = Arc::new(CatalogRegistry::new());
    if config.catalog_paths.is_empty() {
        tracing::warn!("MONIKER_CATALOG_PATHS not set; starting with an empty catalog");
    } else {
        catalog.register_all(load_catalog_sources(config.catalog_paths.as_slice())?)?;
    }

    let domains = Arc::new(DomainRegistry::new());
    if let Some(path) = &config.domains_path {
        let count = domains.register_all(load_domains_file(path)?)?;
        tracing::info!(domains = count, path = %path.display(), "domains loaded");
    }

    let models = Arc::new(ModelRegistry::new());
    if let Some(path) = &config.models_path {
        let count = models.register_all(load_models_file(path)?)?;
        tracing::info!(models = count, path = %path.display(), "business models loaded");
    }

    let tokens = config.write_tokens();
    tokens.warn_if_disabled();

    let adapters = Arc::new(AdapterRegistry::with_defaults());
    let queries = Arc::new(CachedQueryManager::new(config.query_manager_config()));
    let registered = register_cached_queries(&catalog, &queries, &adapters)?;
    tracing::info!(cached_queries = registered, "cached queries registered");

    Ok(ResolutionService::new(catalog, config.service_config())
        .with_domains(domains)
        .with_models(models)
        .with_queries(queries)
        .with_adapters(adapters)
        .with_tokens(tokens))
}
