//! The resolution service.
//!
//! [`ResolutionService`] is the transport-agnostic boundary: every read and
//! governance operation a caller can invoke goes through it. State is passed
//! in at construction; nothing here is process-global.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use moniker_cache::{
    CachedQueryManager, LocalCacheConfig, LocalResultCache, QueryManagerConfig, QueryResult,
    QueryStatus,
};
use moniker_catalog::{
    AuditEntry, BindingMatch, CatalogNode, CatalogRegistry, CatalogStats, CatalogTree,
    DomainRegistry, GovernanceWorkflow, ModelRegistry, MonikerRequest, NodePatch, NodeStatus,
    OwnershipPatch, RequestListing, RequestRegistry, ResolvedOwnership, SubmitRequest,
};
use moniker_core::moniker::validate_path;
use moniker_core::observability::{catalog_span, resolve_span};
use moniker_core::path::last_token;
use moniker_core::{Moniker, RequestId};

use crate::adapter::AdapterRegistry;
use crate::auth::{Privilege, WriteTokens};
use crate::bootstrap::{register_cached_queries, sync_cached_query};
use crate::error::{Result, ServiceError};
use crate::metrics;
use crate::results::{
    CallerIdentity, DescribeResult, FetchResult, FetchSource, LineageLevel, LineageResult,
    ListResult, ResolveResult,
};

/// Default number of successor hops followed from a deprecated binding.
pub const DEFAULT_MAX_SUCCESSOR_DEPTH: usize = 5;

/// Default bound on a live adapter fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Service configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Sizing of the local result caches.
    pub local_cache: LocalCacheConfig,
    /// Bound on a live adapter fetch.
    pub fetch_timeout: Duration,
    /// Successor hops followed from a deprecated binding.
    pub max_successor_depth: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            local_cache: LocalCacheConfig::default(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_successor_depth: DEFAULT_MAX_SUCCESSOR_DEPTH,
        }
    }
}

/// Resolves monikers and fronts the catalog and its governance workflow.
pub struct ResolutionService {
    catalog: Arc<CatalogRegistry>,
    domains: Arc<DomainRegistry>,
    models: Arc<ModelRegistry>,
    workflow: GovernanceWorkflow,
    queries: Arc<CachedQueryManager>,
    adapters: Arc<AdapterRegistry>,
    tokens: WriteTokens,
    resolve_cache: LocalResultCache<ResolveResult>,
    fetch_cache: LocalResultCache<QueryResult>,
    cache_generation: AtomicU64,
    config: ServiceConfig,
}

impl fmt::Debug for ResolutionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionService")
            .field("queries", &self.queries)
            .field("adapters", &self.adapters)
            .field("tokens", &self.tokens)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ResolutionService {
    /// Creates a service over `catalog` with empty domain and model
    /// registries, the built-in adapters, and every write privilege disabled.
    #[must_use]
    pub fn new(catalog: Arc<CatalogRegistry>, config: ServiceConfig) -> Self {
        let queries = CachedQueryManager::new(QueryManagerConfig {
            fetch_timeout: config.fetch_timeout,
            ..QueryManagerConfig::default()
        });
        Self {
            workflow: GovernanceWorkflow::new(
                Arc::clone(&catalog),
                Arc::new(RequestRegistry::new()),
            ),
            catalog,
            domains: Arc::new(DomainRegistry::new()),
            models: Arc::new(ModelRegistry::new()),
            queries: Arc::new(queries),
            adapters: Arc::new(AdapterRegistry::with_defaults()),
            tokens: WriteTokens::disabled(),
            resolve_cache: LocalResultCache::new(config.local_cache),
            fetch_cache: LocalResultCache::new(config.local_cache),
            cache_generation: AtomicU64::new(0),
            config,
        }
    }

    /// Uses the given domain registry.
    #[must_use]
    pub fn with_domains(mut self, domains: Arc<DomainRegistry>) -> Self {
        self.domains = domains;
        self
    }

    /// Uses the given business-model registry.
    #[must_use]
    pub fn with_models(mut self, models: Arc<ModelRegistry>) -> Self {
        self.models = models;
        self
    }

    /// Uses the given request store.
    #[must_use]
    pub fn with_requests(mut self, requests: Arc<RequestRegistry>) -> Self {
        self.workflow = GovernanceWorkflow::new(Arc::clone(&self.catalog), requests);
        self
    }

    /// Uses the given cached query manager.
    #[must_use]
    pub fn with_queries(mut self, queries: Arc<CachedQueryManager>) -> Self {
        self.queries = queries;
        self
    }

    /// Uses the given adapter registry.
    #[must_use]
    pub fn with_adapters(mut self, adapters: Arc<AdapterRegistry>) -> Self {
        self.adapters = adapters;
        self
    }

    /// Uses the given write tokens.
    #[must_use]
    pub fn with_tokens(mut self, tokens: WriteTokens) -> Self {
        self.tokens = tokens;
        self
    }

    /// Returns the catalog.
    #[must_use]
    pub fn catalog(&self) -> &Arc<CatalogRegistry> {
        &self.catalog
    }

    /// Returns the domain registry.
    #[must_use]
    pub fn domains(&self) -> &Arc<DomainRegistry> {
        &self.domains
    }

    /// Returns the cached query manager.
    #[must_use]
    pub fn queries(&self) -> &Arc<CachedQueryManager> {
        &self.queries
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> ServiceConfig {
        self.config
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Resolves a moniker to its source binding.
    ///
    /// Emits one access event (target `moniker::access`) per call, whatever
    /// the outcome.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Parse`] for malformed monikers
    /// - [`ServiceError::NotFound`] if no resolvable binding serves the path
    /// - [`ServiceError::AccessDenied`] if the binding's access policy vetoes
    ///   the query
    pub fn resolve(&self, moniker: &str, caller: &CallerIdentity) -> Result<ResolveResult> {
        let span = resolve_span(moniker);
        let _entered = span.enter();
        let started = Instant::now();

        let outcome = self.resolve_cached(moniker);
        let label = match &outcome {
            Ok((_, true)) => "cached",
            Ok((_, false)) => "ok",
            Err(e) => e.code(),
        };
        metrics::record_resolve(label, started.elapsed());
        log_access(caller, moniker, &outcome);
        outcome.map(|(result, _)| result)
    }

    /// Resolves a moniker and returns its rows.
    ///
    /// A binding with a registered cached query serves requests for its
    /// latest unfiltered data from that cache; a filter, a version other than
    /// `latest` or a query parameter bypasses it. Everything else goes
    /// through the local result cache and then the adapter for the binding's
    /// source type, bounded by the fetch timeout.
    ///
    /// # Errors
    ///
    /// Any [`resolve`](Self::resolve) error, or [`ServiceError::Unavailable`]
    /// if the cached query has no value yet or the adapter fails or times out.
    pub async fn fetch(&self, moniker: &str, caller: &CallerIdentity) -> Result<FetchResult> {
        let generation = self.cache_generation();
        let resolved = self.resolve(moniker, caller)?;
        let parsed = Moniker::parse(moniker)?;

        if serves_cached_query(&parsed, &resolved)
            && self.queries.is_registered(&resolved.binding_path)
        {
            let lookup = self.queries.get(&resolved.binding_path).await?;
            let stale = !lookup.is_fresh();
            let Some(value) = lookup.value().cloned() else {
                return Err(ServiceError::unavailable(format!(
                    "cached query for '{}' is not yet available",
                    resolved.binding_path
                )));
            };
            return Ok(fetched(resolved, FetchSource::CachedQuery, stale, value.result));
        }

        if let Some(result) = self.fetch_cache.get(&resolved.moniker) {
            return Ok(fetched(resolved, FetchSource::LocalCache, false, result));
        }

        let request = resolved.fetch_request();
        let timeout = self.config.fetch_timeout;
        let result = tokio::time::timeout(timeout, self.adapters.fetch(&request))
            .await
            .map_err(|_| {
                tracing::warn!(
                    moniker = %resolved.moniker,
                    timeout_ms = timeout.as_millis(),
                    "adapter fetch timed out"
                );
                ServiceError::unavailable(format!(
                    "fetch for '{}' timed out after {}ms",
                    resolved.moniker,
                    timeout.as_millis()
                ))
            })??;
        store_if_current(
            &self.fetch_cache,
            &self.cache_generation,
            generation,
            resolved.moniker.clone(),
            result.clone(),
        );
        Ok(fetched(resolved, FetchSource::Adapter, false, result))
    }

    fn resolve_cached(&self, moniker: &str) -> Result<(ResolveResult, bool)> {
        let parsed = Moniker::parse(moniker)?;
        let key = parsed.to_string();
        let generation = self.cache_generation();
        if let Some(hit) = self.resolve_cache.get(&key) {
            return Ok((hit, true));
        }
        let result = self.resolve_parsed(&parsed)?;
        store_if_current(
            &self.resolve_cache,
            &self.cache_generation,
            generation,
            key,
            result.clone(),
        );
        Ok((result, false))
    }

    fn cache_generation(&self) -> u64 {
        self.cache_generation.load(Ordering::SeqCst)
    }

    fn resolve_parsed(&self, moniker: &Moniker) -> Result<ResolveResult> {
        let path = moniker.path();
        let found = self
            .catalog
            .find_source_binding(&path)?
            .ok_or_else(|| ServiceError::not_found(format!("no source binding found for '{path}'")))?;
        let filters = remaining_filters(moniker, &found.binding_path);

        let (found, redirected_from) = match self.follow_successors(&found)? {
            Some(successor) => {
                tracing::debug!(
                    from = %found.binding_path,
                    to = %successor.binding_path,
                    "redirected deprecated binding"
                );
                (successor, Some(found.binding_path))
            }
            None => (found, None),
        };
        let node = &found.node;
        let binding = node.source_binding.as_ref().ok_or_else(|| {
            ServiceError::internal(format!("binding node '{}' has no binding", found.binding_path))
        })?;

        let mut access_warning = None;
        let mut estimated_rows = None;
        if let Some(policy) = &node.access_policy {
            let decision = policy.evaluate(&filters, binding.segment_labels.len());
            if !decision.allowed {
                return Err(ServiceError::access_denied(
                    decision
                        .message
                        .unwrap_or_else(|| "denied by access policy".to_string()),
                    Some(decision.estimated_rows),
                ));
            }
            access_warning = decision.warning;
            estimated_rows = Some(decision.estimated_rows);
        }

        let deprecation_message = (node.status == NodeStatus::Deprecated).then(|| {
            node.deprecation_message.clone().unwrap_or_else(|| match &node.successor {
                Some(successor) => format!("'{}' is deprecated; use '{successor}'", node.path),
                None => format!("'{}' is deprecated", node.path),
            })
        });

        let ownership_path = if redirected_from.is_some() {
            found.binding_path.as_str()
        } else {
            path.as_str()
        };
        let ownership = self
            .catalog
            .resolve_ownership(ownership_path, &self.domains)?;

        Ok(ResolveResult {
            moniker: moniker.to_string(),
            path: path.clone(),
            binding_path: found.binding_path.clone(),
            source_type: binding.source_type,
            connection: binding.connection_params(),
            query: binding
                .query_template()
                .map(|template| render_query(template, moniker, &filters, &binding.segment_labels)),
            params: moniker.params().iter().cloned().collect(),
            schema: binding.schema.clone(),
            read_only: binding.read_only,
            ownership,
            filters,
            segment_labels: binding.segment_labels.clone(),
            redirected_from,
            deprecation_message,
            access_warning,
            estimated_rows,
            binding_fingerprint: binding.fingerprint(),
        })
    }

    /// Follows the successor chain of a deprecated binding node to the first
    /// node that is not itself deprecated-with-successor, and returns the
    /// binding serving it.
    fn follow_successors(&self, found: &BindingMatch) -> Result<Option<BindingMatch>> {
        let node = &found.node;
        if node.status != NodeStatus::Deprecated {
            return Ok(None);
        }
        let Some(mut next) = node.successor.clone() else {
            return Ok(None);
        };
        for _ in 0..self.config.max_successor_depth {
            let Some(successor) = self.catalog.get(&next)? else {
                break;
            };
            match (successor.status, successor.successor) {
                (NodeStatus::Deprecated, Some(further)) => next = further,
                _ => {
                    let target = self.catalog.find_source_binding(&next)?;
                    if target.is_none() {
                        break;
                    }
                    return Ok(target);
                }
            }
        }
        tracing::warn!(
            path = %found.binding_path,
            successor = %next,
            "successor chain did not reach a resolvable binding"
        );
        Ok(None)
    }

    // ------------------------------------------------------------------
    // Catalog reads
    // ------------------------------------------------------------------

    /// Describes a catalog path.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Parse`] if `path` is not a valid catalog path.
    pub fn describe(&self, path: &str) -> Result<DescribeResult> {
        let path = validate_path(path)?;
        let _entered = catalog_span("describe", &path).entered();
        let node = self.catalog.get(&path)?;
        let binding = self.catalog.find_source_binding(&path)?;
        let ownership = self.catalog.resolve_ownership(&path, &self.domains)?;
        let related_models = self.models.models_for_moniker(&path)?;

        let bound = binding
            .as_ref()
            .and_then(|m| m.node.source_binding.as_ref().map(|b| (m, b)));
        Ok(DescribeResult {
            moniker: format!("moniker://{path}"),
            has_source_binding: bound.is_some(),
            source_type: bound.map(|(_, b)| b.source_type),
            binding_path: bound.map(|(m, _)| m.binding_path.clone()),
            binding_fingerprint: bound.map(|(_, b)| b.fingerprint()),
            ownership,
            schema: node.as_ref().and_then(|n| n.data_schema.clone()),
            data_quality: node.as_ref().and_then(|n| n.data_quality.clone()),
            sla: node.as_ref().and_then(|n| n.sla.clone()),
            freshness: node.as_ref().and_then(|n| n.freshness.clone()),
            documentation: node.as_ref().and_then(|n| n.documentation.clone()),
            related_models,
            node,
            path,
        })
    }

    /// Lists the direct children of `path` (`""` for the top level).
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Parse`] if `path` is not a valid catalog path.
    pub fn list_children(&self, path: &str) -> Result<ListResult> {
        let path = normalize_root(path)?;
        let mut children: Vec<String> = self
            .catalog
            .children_paths(&path)?
            .iter()
            .map(|child| last_token(child).to_string())
            .collect();
        children.sort();
        let ownership = if path.is_empty() {
            ResolvedOwnership::default()
        } else {
            self.catalog.resolve_ownership(&path, &self.domains)?
        };
        Ok(ListResult {
            path,
            children,
            ownership,
        })
    }

    /// Free-text search over paths, names, descriptions and tags, optionally
    /// restricted to nodes with the given status name.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::BadRequest`] for an unknown status, or an error
    /// if the catalog cannot be read.
    pub fn search(
        &self,
        query: &str,
        status: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CatalogNode>> {
        let status = status.map(str::parse::<NodeStatus>).transpose()?;
        Ok(self.catalog.search(query, status, limit)?)
    }

    /// Returns the ancestor chain of `path` with ownership provenance.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Parse`] if `path` is not a valid catalog path
    /// - [`ServiceError::NotFound`] if neither the path nor any ancestor is
    ///   registered
    pub fn lineage(&self, path: &str) -> Result<LineageResult> {
        let path = validate_path(path)?;
        let chain = self.catalog.ancestor_chain(&path)?;
        if chain.iter().all(|(_, node)| node.is_none()) {
            return Err(ServiceError::not_found(format!(
                "no catalog entry at or above '{path}'"
            )));
        }
        let levels = chain
            .into_iter()
            .map(|(level, node)| LineageLevel {
                registered: node.is_some(),
                status: node.as_ref().map(|n| n.status),
                defined_roles: node
                    .as_ref()
                    .map(|n| n.ownership.defined_roles())
                    .unwrap_or_default(),
                path: level,
            })
            .collect();
        let ownership = self.catalog.resolve_ownership(&path, &self.domains)?;
        Ok(LineageResult {
            path,
            levels,
            ownership,
        })
    }

    /// Returns the catalog tree under `root` (`""` for everything).
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Parse`] if `root` is not a valid catalog path
    /// - [`ServiceError::NotFound`] if nothing is registered at or under it
    pub fn tree(&self, root: &str, max_depth: usize) -> Result<CatalogTree> {
        let root = normalize_root(root)?;
        self.catalog
            .tree(&root, max_depth)?
            .ok_or_else(|| ServiceError::not_found(format!("no catalog entries under '{root}'")))
    }

    /// Returns node counts by status and source type.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    pub fn stats(&self) -> Result<CatalogStats> {
        Ok(self.catalog.stats()?)
    }

    /// Returns audit entries in append order, optionally for one path and
    /// limited to the most recent `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    pub fn audit_log(&self, path: Option<&str>, limit: Option<usize>) -> Result<Vec<AuditEntry>> {
        Ok(self.catalog.audit_log(path, limit)?)
    }

    /// Reports the state of every cached query.
    #[must_use]
    pub fn cache_status(&self) -> Vec<QueryStatus> {
        self.queries.status()
    }

    // ------------------------------------------------------------------
    // Governance
    // ------------------------------------------------------------------

    /// Submits a request for a new catalog path.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Unauthorized`] without the submit privilege
    /// - [`ServiceError::BadRequest`] for an invalid or unanchored path
    /// - [`ServiceError::Conflict`] if the path exists or has a pending request
    pub fn submit(&self, token: Option<&str>, input: SubmitRequest) -> Result<MonikerRequest> {
        self.governed(Privilege::Submit, token, "submit", |workflow| {
            workflow.submit(input)
        })
    }

    /// Appends a review comment to a request.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Unauthorized`] without the submit privilege,
    /// [`ServiceError::BadRequest`] for a malformed id, or
    /// [`ServiceError::NotFound`] for an unknown request.
    pub fn add_comment(
        &self,
        token: Option<&str>,
        id: &str,
        author: &str,
        content: &str,
    ) -> Result<MonikerRequest> {
        self.governed(Privilege::Submit, token, "comment", |workflow| {
            workflow.add_comment(id.parse::<RequestId>()?, author, content)
        })
    }

    /// Approves a pending request and activates its node.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Unauthorized`] without the approve privilege
    /// - [`ServiceError::NotFound`] for an unknown request
    /// - [`ServiceError::BadRequest`] if the request is not pending or the
    ///   reason is blank
    pub fn approve(
        &self,
        token: Option<&str>,
        id: &str,
        actor: &str,
        reason: &str,
    ) -> Result<MonikerRequest> {
        let approved = self.governed(Privilege::Approve, token, "approve", |workflow| {
            workflow.approve(id.parse::<RequestId>()?, actor, reason)
        })?;
        self.sync_cached_query(&approved.path);
        Ok(approved)
    }

    /// Rejects a pending request and returns its node to draft.
    ///
    /// # Errors
    ///
    /// Same as [`approve`](Self::approve).
    pub fn reject(
        &self,
        token: Option<&str>,
        id: &str,
        actor: &str,
        reason: &str,
    ) -> Result<MonikerRequest> {
        let rejected = self.governed(Privilege::Approve, token, "reject", |workflow| {
            workflow.reject(id.parse::<RequestId>()?, actor, reason)
        })?;
        self.sync_cached_query(&rejected.path);
        Ok(rejected)
    }

    /// Sets a node's lifecycle status. A node that can no longer serve
    /// resolve calls stops refreshing its cached query.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Unauthorized`] without the approve privilege
    /// - [`ServiceError::NotFound`] for an unregistered path
    /// - [`ServiceError::BadRequest`] for an unknown status
    pub fn update_node_status(
        &self,
        token: Option<&str>,
        path: &str,
        status: &str,
        actor: &str,
    ) -> Result<CatalogNode> {
        let node = self.governed(Privilege::Approve, token, "update_status", |workflow| {
            workflow.update_node_status(path, status, actor)
        })?;
        self.sync_cached_query(&node.path);
        Ok(node)
    }

    /// Applies an ownership patch to a node.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Unauthorized`] without the approve privilege or
    /// [`ServiceError::NotFound`] for an unregistered path.
    pub fn update_ownership(
        &self,
        token: Option<&str>,
        path: &str,
        patch: &OwnershipPatch,
        actor: &str,
    ) -> Result<CatalogNode> {
        self.governed(Privilege::Approve, token, "update_ownership", |workflow| {
            workflow.update_ownership(path, patch, actor)
        })
    }

    /// Applies a metadata patch to a node.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Unauthorized`] without the approve privilege or
    /// [`ServiceError::NotFound`] for an unregistered path.
    pub fn update_metadata(
        &self,
        token: Option<&str>,
        path: &str,
        patch: &NodePatch,
        actor: &str,
    ) -> Result<CatalogNode> {
        self.governed(Privilege::Approve, token, "update_metadata", |workflow| {
            workflow.update_metadata(path, patch, actor)
        })
    }

    /// Lists requests, optionally filtered by status name.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::BadRequest`] for an unknown status.
    pub fn list_requests(&self, status: Option<&str>) -> Result<RequestListing> {
        Ok(self.workflow.list_requests(status)?)
    }

    /// Returns one request.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::BadRequest`] for a malformed id or
    /// [`ServiceError::NotFound`] for an unknown request.
    pub fn get_request(&self, id: &str) -> Result<MonikerRequest> {
        let id: RequestId = id.parse()?;
        Ok(self.workflow.get_request(id)?)
    }

    /// Replaces the whole catalog node set and re-registers cached queries.
    ///
    /// # Errors
    ///
    /// Returns an error if a node path is invalid; nothing changes then.
    pub fn reload_catalog(&self, nodes: Vec<CatalogNode>) -> Result<usize> {
        let count = self.catalog.replace_all(nodes)?;
        for path in self.queries.paths() {
            self.queries.unregister(&path);
        }
        register_cached_queries(&self.catalog, &self.queries, &self.adapters)?;
        self.invalidate_local_caches();
        Ok(count)
    }

    /// Registers or drops the cached query for `path` to match its node.
    fn sync_cached_query(&self, path: &str) {
        if let Err(e) = sync_cached_query(&self.catalog, &self.queries, &self.adapters, path) {
            tracing::warn!(path, error = %e, "failed to sync cached query");
        }
    }

    /// Drops every local resolve and fetch result.
    ///
    /// Results computed before the call are not cached afterwards.
    pub fn invalidate_local_caches(&self) {
        self.cache_generation.fetch_add(1, Ordering::SeqCst);
        self.resolve_cache.clear();
        self.fetch_cache.clear();
    }

    fn governed<T>(
        &self,
        privilege: Privilege,
        token: Option<&str>,
        operation: &'static str,
        op: impl FnOnce(&GovernanceWorkflow) -> moniker_catalog::Result<T>,
    ) -> Result<T> {
        if let Err(e) = self.tokens.authorize(privilege, token) {
            metrics::record_write(operation, "unauthorized");
            return Err(e);
        }
        match op(&self.workflow) {
            Ok(value) => {
                self.invalidate_local_caches();
                metrics::record_write(operation, "ok");
                Ok(value)
            }
            Err(e) => {
                metrics::record_write(operation, "error");
                tracing::debug!(operation, error = %e, "governance write refused");
                Err(e.into())
            }
        }
    }
}

fn fetched(
    resolved: ResolveResult,
    source: FetchSource,
    stale: bool,
    result: QueryResult,
) -> FetchResult {
    metrics::record_fetch(source.as_str());
    FetchResult {
        moniker: resolved.moniker,
        binding_path: resolved.binding_path,
        source,
        stale,
        result,
    }
}

/// Inserts a computed result unless the caches were invalidated since
/// `generation` was read. Returns whether the entry was kept.
fn store_if_current<V: Clone>(
    cache: &LocalResultCache<V>,
    current: &AtomicU64,
    generation: u64,
    key: String,
    value: V,
) -> bool {
    if current.load(Ordering::SeqCst) != generation {
        return false;
    }
    cache.insert(key.clone(), value);
    // An invalidation racing the insert may have cleared before it landed.
    if current.load(Ordering::SeqCst) != generation {
        cache.remove(&key);
        return false;
    }
    true
}

/// Whether `moniker` asks for exactly what a binding's cached query holds:
/// the latest unfiltered rows with no extra parameters.
fn serves_cached_query(moniker: &Moniker, resolved: &ResolveResult) -> bool {
    resolved.filters.is_empty() && moniker.is_latest() && moniker.params().is_empty()
}

fn normalize_root(path: &str) -> Result<String> {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        Ok(String::new())
    } else {
        Ok(validate_path(trimmed)?)
    }
}

/// Filters of `moniker` left over after `binding_path`.
///
/// The remainder is the canonical path with the binding path stripped as a
/// prefix. Extra dotted tokens after a base-level binding become one filter
/// each. A dotted qualifier inside a bound segment stays whole, as do later
/// segments.
fn remaining_filters(moniker: &Moniker, binding_path: &str) -> Vec<String> {
    let path = moniker.path();
    let Some(rest) = path.strip_prefix(binding_path) else {
        return moniker.segments().to_vec();
    };
    let mut pieces = rest.split('/');
    let head = pieces.next().unwrap_or_default();
    let mut filters: Vec<String> = match head.strip_prefix('.') {
        Some(tail) if binding_path.contains('/') => vec![tail.to_string()],
        Some(tail) => tail.split('.').map(str::to_string).collect(),
        None => Vec::new(),
    };
    filters.extend(pieces.map(str::to_string));
    filters
}

/// Substitutes placeholders in a query template. Placeholders for omitted
/// filter positions are left in place.
fn render_query(template: &str, moniker: &Moniker, filters: &[String], labels: &[String]) -> String {
    let mut query = template.to_string();
    for (idx, value) in filters.iter().enumerate() {
        query = query.replace(&format!("{{segments[{idx}]}}"), value);
        if let Some(label) = labels.get(idx) {
            query = query.replace(&format!("{{{label}}}"), value);
        }
    }
    query = query.replace("{path}", &moniker.path());
    if let Some(version) = moniker.version() {
        query = query.replace("{version}", version);
    }
    if let Some(date) = moniker.version_date() {
        query = query.replace("{version_date}", date);
    }
    query.replace(
        "{is_latest}",
        if moniker.is_latest() { "true" } else { "false" },
    )
}

fn log_access(caller: &CallerIdentity, moniker: &str, outcome: &Result<(ResolveResult, bool)>) {
    match outcome {
        Ok((result, cached)) => tracing::info!(
            target: "moniker::access",
            principal = caller.principal(),
            user_id = caller.user_id.as_deref(),
            service_id = caller.service_id.as_deref(),
            app_id = caller.app_id.as_deref(),
            moniker,
            outcome = "success",
            cached = *cached,
            binding_path = %result.binding_path,
            estimated_rows = result.estimated_rows,
            "moniker resolved"
        ),
        Err(e) => {
            let estimated_rows = match e {
                ServiceError::AccessDenied { estimated_rows, .. } => *estimated_rows,
                _ => None,
            };
            tracing::info!(
                target: "moniker::access",
                principal = caller.principal(),
                user_id = caller.user_id.as_deref(),
                service_id = caller.service_id.as_deref(),
                app_id = caller.app_id.as_deref(),
                moniker,
                outcome = e.code(),
                estimated_rows,
                error = %e,
                "moniker resolution failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moniker_catalog::{AccessPolicy, Ownership, OwnershipRole, SourceBinding, SourceType};

    const SUBMIT: &str = "submit-secret";
    const APPROVE: &str = "approve-secret";

    fn cvar_binding() -> SourceBinding {
        SourceBinding::new(SourceType::Snowflake)
            .with_config(
                "query",
                "SELECT * FROM cvar WHERE desk = '{segments[0]}' AND book = '{book}' AND asof = '{version_date}' AND latest = {is_latest}",
            )
            .with_config("warehouse", "RISK_WH")
            .with_segment_labels(["desk", "book"])
    }

    fn service() -> ResolutionService {
        let catalog = Arc::new(CatalogRegistry::new());
        catalog
            .register_all([
                CatalogNode::new("risk").with_ownership(
                    Ownership::new().with(OwnershipRole::AccountableOwner, "risk-owner@firm.com"),
                ),
                CatalogNode::new("risk.cvar")
                    .with_binding(cvar_binding())
                    .with_ownership(
                        Ownership::new().with(OwnershipRole::SupportChannel, "#risk-cvar"),
                    ),
                CatalogNode::new("risk.legacy")
                    .with_binding(SourceBinding::new(SourceType::Oracle))
                    .deprecated_for("risk.cvar", "moved to risk.cvar"),
                CatalogNode::new("prices.equity")
                    .with_binding(
                        SourceBinding::new(SourceType::Static).with_segment_labels(["ticker"]),
                    )
                    .with_access_policy(AccessPolicy {
                        required_segments: vec![0],
                        ..AccessPolicy::default()
                    }),
            ])
            .unwrap();
        ResolutionService::new(catalog, ServiceConfig::default())
            .with_tokens(WriteTokens::from_secrets(Some(SUBMIT), Some(APPROVE), None))
    }

    fn anon() -> CallerIdentity {
        CallerIdentity::default()
    }

    #[test]
    fn resolve_renders_template_and_inherits_ownership() {
        let svc = service();
        let result = svc
            .resolve("moniker://risk.cvar/rates/book1@20240131", &anon())
            .unwrap();

        assert_eq!(result.path, "risk.cvar/rates/book1");
        assert_eq!(result.binding_path, "risk.cvar");
        assert_eq!(result.filters, vec!["rates", "book1"]);
        assert_eq!(result.source_type, SourceType::Snowflake);
        assert!(result.connection.contains_key("warehouse"));
        assert_eq!(
            result.query.as_deref(),
            Some(
                "SELECT * FROM cvar WHERE desk = 'rates' AND book = 'book1' AND asof = '20240131' AND latest = false"
            )
        );
        assert_eq!(
            result.ownership.value(OwnershipRole::AccountableOwner),
            Some("risk-owner@firm.com")
        );
        assert_eq!(
            result.ownership.value(OwnershipRole::SupportChannel),
            Some("#risk-cvar")
        );
        assert!(result.read_only);
        assert_eq!(result.binding_fingerprint.len(), 16);
    }

    #[test]
    fn omitted_positions_stay_verbatim() {
        let svc = service();
        let result = svc.resolve("risk.cvar", &anon()).unwrap();
        let query = result.query.unwrap();
        assert!(query.contains("{segments[0]}"));
        assert!(query.contains("{book}"));
        assert!(query.contains("latest = true"));
    }

    #[test]
    fn deprecated_binding_redirects_to_successor() {
        let svc = service();
        let result = svc.resolve("risk.legacy/rates", &anon()).unwrap();
        assert_eq!(result.binding_path, "risk.cvar");
        assert_eq!(result.redirected_from.as_deref(), Some("risk.legacy"));
        assert_eq!(result.filters, vec!["rates"]);
        assert!(result.deprecation_message.is_none());
    }

    #[test]
    fn access_policy_denial_carries_estimate() {
        let svc = service();
        let err = svc.resolve("prices.equity", &anon()).unwrap_err();
        assert_eq!(
            err,
            ServiceError::access_denied(
                "access policy requires filter segment 0 to be specified",
                Some(10_000)
            )
        );

        let ok = svc.resolve("prices.equity/AAPL", &anon()).unwrap();
        assert_eq!(ok.estimated_rows, Some(100));
    }

    #[test]
    fn resolve_failures_use_the_taxonomy() {
        let svc = service();
        assert_eq!(svc.resolve("", &anon()).unwrap_err().code(), "PARSE_ERROR");
        assert_eq!(
            svc.resolve("risk.cvar/ALL", &anon()).unwrap_err().code(),
            "PARSE_ERROR"
        );
        assert_eq!(
            svc.resolve("rates.curves", &anon()).unwrap_err().code(),
            "NOT_FOUND"
        );
    }

    #[test]
    fn governance_writes_invalidate_cached_resolutions() {
        let svc = service();
        svc.resolve("risk.cvar/rates", &anon()).unwrap();

        svc.update_node_status(Some(APPROVE), "risk.cvar", "archived", "steward")
            .unwrap();
        let err = svc.resolve("risk.cvar/rates", &anon()).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn write_tokens_gate_each_privilege() {
        let svc = service();
        let input = SubmitRequest {
            path: "risk.var".to_string(),
            requester: "analyst@firm.com".to_string(),
            ..SubmitRequest::default()
        };

        let err = svc.submit(None, input.clone()).unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
        let err = svc.submit(Some(APPROVE), input.clone()).unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");

        let request = svc.submit(Some(SUBMIT), input).unwrap();
        let id = request.id.to_string();
        assert_eq!(
            svc.approve(Some(SUBMIT), &id, "lead", "ok").unwrap_err().code(),
            "UNAUTHORIZED"
        );
        let approved = svc.approve(Some(APPROVE), &id, "lead", "ok").unwrap();
        assert_eq!(approved.approved_by.as_deref(), Some("lead"));
        assert_eq!(
            svc.approve(Some(APPROVE), &id, "lead", "again").unwrap_err().code(),
            "BAD_REQUEST"
        );
    }

    #[test]
    fn malformed_request_id_is_bad_request() {
        let svc = service();
        assert_eq!(svc.get_request("req-nope").unwrap_err().code(), "BAD_REQUEST");
        assert_eq!(
            svc.get_request(&RequestId::generate().to_string())
                .unwrap_err()
                .code(),
            "NOT_FOUND"
        );
    }

    #[test]
    fn describe_and_list_children() {
        let svc = service();
        let described = svc.describe("risk.cvar/rates").unwrap();
        assert!(described.node.is_none());
        assert!(described.has_source_binding);
        assert_eq!(described.binding_path.as_deref(), Some("risk.cvar"));
        assert_eq!(described.moniker, "moniker://risk.cvar/rates");

        let listed = svc.list_children("risk").unwrap();
        assert_eq!(listed.children, vec!["cvar", "legacy"]);
        assert_eq!(
            listed.ownership.value(OwnershipRole::AccountableOwner),
            Some("risk-owner@firm.com")
        );

        let top = svc.list_children("").unwrap();
        assert_eq!(top.children, vec!["risk"]);
    }

    #[test]
    fn lineage_reports_provenance() {
        let svc = service();
        let lineage = svc.lineage("risk.cvar/rates").unwrap();
        let paths: Vec<_> = lineage.levels.iter().map(|l| l.path.as_str()).collect();
        assert_eq!(paths, vec!["risk.cvar/rates", "risk.cvar", "risk"]);
        assert!(!lineage.levels[0].registered);
        assert_eq!(
            lineage.levels[1].defined_roles,
            vec![OwnershipRole::SupportChannel]
        );

        assert_eq!(svc.lineage("rates.curves").unwrap_err().code(), "NOT_FOUND");
    }

    #[test]
    fn remaining_filters_by_binding_shape() {
        let moniker = Moniker::parse("risk.cvar.daily/rates/book1").unwrap();
        assert_eq!(
            remaining_filters(&moniker, "risk.cvar"),
            vec!["daily", "rates", "book1"]
        );
        assert_eq!(
            remaining_filters(&moniker, "risk.cvar.daily/rates"),
            vec!["book1"]
        );
        assert!(remaining_filters(&moniker, "risk.cvar.daily/rates/book1").is_empty());

        let qualified = Moniker::parse("prices.equity/us.large/tech").unwrap();
        assert_eq!(
            remaining_filters(&qualified, "prices.equity/us"),
            vec!["large", "tech"]
        );
        assert_eq!(
            remaining_filters(&qualified, "prices.equity"),
            vec!["us.large", "tech"]
        );
    }

    #[test]
    fn dotted_qualifier_below_segment_binding_is_a_filter() {
        let catalog = Arc::new(CatalogRegistry::new());
        catalog
            .register_all([
                CatalogNode::new("prices.equity")
                    .with_binding(SourceBinding::new(SourceType::Static)),
                CatalogNode::new("prices.equity/us")
                    .with_binding(SourceBinding::new(SourceType::Static)),
            ])
            .unwrap();
        let svc = ResolutionService::new(catalog, ServiceConfig::default());

        let result = svc.resolve("prices.equity/us.large", &anon()).unwrap();
        assert_eq!(result.binding_path, "prices.equity/us");
        assert_eq!(result.filters, vec!["large"]);

        let whole = svc.resolve("prices.equity/us", &anon()).unwrap();
        assert!(whole.filters.is_empty());
    }

    #[test]
    fn resolution_computed_before_invalidation_is_not_cached() {
        let svc = service();
        let parsed = Moniker::parse("risk.cvar/rates").unwrap();
        let generation = svc.cache_generation();
        let stale = svc.resolve_parsed(&parsed).unwrap();

        svc.invalidate_local_caches();
        let kept = store_if_current(
            &svc.resolve_cache,
            &svc.cache_generation,
            generation,
            parsed.to_string(),
            stale,
        );
        assert!(!kept);
        assert!(svc.resolve_cache.get(&parsed.to_string()).is_none());

        let fresh = svc.resolve_parsed(&parsed).unwrap();
        assert!(store_if_current(
            &svc.resolve_cache,
            &svc.cache_generation,
            svc.cache_generation(),
            parsed.to_string(),
            fresh,
        ));
    }

    #[test]
    fn archiving_a_node_drops_its_cached_query() {
        let catalog = Arc::new(CatalogRegistry::new());
        catalog
            .register(
                CatalogNode::new("refdata.currencies").with_binding(
                    SourceBinding::new(SourceType::Static)
                        .with_cache(moniker_core::CachePolicy::enabled(300, 60)),
                ),
            )
            .unwrap();
        let svc = ResolutionService::new(catalog, ServiceConfig::default())
            .with_tokens(WriteTokens::from_secrets(Some(SUBMIT), Some(APPROVE), None));
        register_cached_queries(&svc.catalog, &svc.queries, &svc.adapters).unwrap();
        assert!(svc.queries().is_registered("refdata.currencies"));

        svc.update_node_status(Some(APPROVE), "refdata.currencies", "archived", "steward")
            .unwrap();
        assert!(!svc.queries().is_registered("refdata.currencies"));

        svc.update_node_status(Some(APPROVE), "refdata.currencies", "active", "steward")
            .unwrap();
        assert!(svc.queries().is_registered("refdata.currencies"));
    }
}
