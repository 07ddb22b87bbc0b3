//! Cached query manager.
//!
//! Holds one entry per cache-eligible path. Each entry owns the fetcher that
//! produces its value, the last good value, and an in-flight flag that makes
//! refreshes single-flight. Readers never wait on a refresh: they get the last
//! good value (fresh or stale) or [`QueryLookup::NotYetAvailable`].
//!
//! A background loop ([`CachedQueryManager::run_refresh_loop`]) wakes every
//! tick, spawns one task per due entry and waits for that tick's tasks. A
//! failed or timed-out fetch keeps the previous value.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::Instrument;

use moniker_core::CachePolicy;
use moniker_core::observability::refresh_span;

use crate::error::{CacheError, Result};
use crate::metrics;
use crate::result::QueryResult;
use crate::shared::{SharedCache, query_key};

/// Default interval between refresh-loop ticks.
pub const DEFAULT_TICK: Duration = Duration::from_secs(30);

/// Default bound on a single fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Produces the value of one cached query.
#[async_trait]
pub trait QueryFetcher: Send + Sync {
    /// Fetches the current rows for `path`.
    async fn fetch(&self, path: &str) -> Result<QueryResult>;
}

/// Adapts an async closure into a [`QueryFetcher`].
pub struct FnFetcher<F>(F);

impl<F> FnFetcher<F> {
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> fmt::Debug for FnFetcher<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFetcher").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> QueryFetcher for FnFetcher<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<QueryResult>> + Send,
{
    async fn fetch(&self, path: &str) -> Result<QueryResult> {
        (self.0)(path.to_string()).await
    }
}

/// Boxes an async closure as a shareable [`QueryFetcher`].
pub fn query_fetcher<F, Fut>(f: F) -> Arc<dyn QueryFetcher>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<QueryResult>> + Send + 'static,
{
    Arc::new(FnFetcher::new(f))
}

/// Configuration for [`CachedQueryManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryManagerConfig {
    /// Interval between refresh-loop ticks.
    pub tick: Duration,
    /// Bound on a single fetch; a timeout counts as a failure.
    pub fetch_timeout: Duration,
}

impl Default for QueryManagerConfig {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// A cached value and when it was refreshed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedValue {
    /// The cached rows.
    pub result: QueryResult,
    /// When the refresh that produced it completed.
    pub refreshed_at: DateTime<Utc>,
}

/// Result of reading a cached query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryLookup {
    /// Younger than the TTL and the last refresh succeeded.
    Fresh(CachedValue),
    /// Older than the TTL, or the last refresh failed.
    Stale(CachedValue),
    /// No refresh has succeeded yet.
    NotYetAvailable,
}

impl QueryLookup {
    /// Returns the value, fresh or stale.
    #[must_use]
    pub fn value(&self) -> Option<&CachedValue> {
        match self {
            Self::Fresh(value) | Self::Stale(value) => Some(value),
            Self::NotYetAvailable => None,
        }
    }

    /// Returns true for [`QueryLookup::Fresh`].
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }
}

/// Outcome of a single refresh attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The fetch succeeded and the value was replaced.
    Refreshed,
    /// The fetch failed; the previous value is kept.
    Failed(String),
    /// The fetch exceeded the timeout; the previous value is kept.
    TimedOut,
    /// Another refresh for the same path was running; nothing was done.
    AlreadyInFlight,
}

impl RefreshOutcome {
    /// Returns true for [`RefreshOutcome::Refreshed`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Refreshed)
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Refreshed => "success",
            Self::Failed(_) => "failure",
            Self::TimedOut => "timeout",
            Self::AlreadyInFlight => "skipped_in_flight",
        }
    }
}

/// Per-path status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryStatus {
    /// Cached query path.
    pub path: String,
    /// Whether a value has been loaded in this process.
    pub has_value: bool,
    /// Completion time of the last successful refresh.
    pub last_refresh: Option<DateTime<Utc>>,
    /// Error from the last attempt, cleared by the next success.
    pub last_error: Option<String>,
    /// Whether a refresh is running now.
    pub in_flight: bool,
    /// Successful refreshes.
    pub refresh_count: u64,
    /// Failed or timed-out refreshes.
    pub failure_count: u64,
    /// Configured TTL in seconds.
    pub ttl_seconds: u64,
    /// Effective refresh cadence in seconds.
    pub refresh_interval_seconds: u64,
}

#[derive(Debug, Default)]
struct EntryState {
    value: Option<CachedValue>,
    loaded_at: Option<Instant>,
    last_error: Option<String>,
    refresh_count: u64,
    failure_count: u64,
}

struct QueryEntry {
    path: String,
    policy: CachePolicy,
    fetcher: Arc<dyn QueryFetcher>,
    in_flight: AtomicBool,
    state: RwLock<EntryState>,
}

impl QueryEntry {
    fn read(&self) -> RwLockReadGuard<'_, EntryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, EntryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_due(&self, now: Instant) -> bool {
        if self.in_flight.load(Ordering::Acquire) {
            return false;
        }
        match self.read().loaded_at {
            None => true,
            Some(loaded_at) => now.duration_since(loaded_at) >= self.policy.refresh_interval(),
        }
    }

    fn status(&self) -> QueryStatus {
        let state = self.read();
        QueryStatus {
            path: self.path.clone(),
            has_value: state.value.is_some(),
            last_refresh: state.value.as_ref().map(|v| v.refreshed_at),
            last_error: state.last_error.clone(),
            in_flight: self.in_flight.load(Ordering::Acquire),
            refresh_count: state.refresh_count,
            failure_count: state.failure_count,
            ttl_seconds: self.policy.ttl_seconds,
            refresh_interval_seconds: self.policy.refresh_interval().as_secs(),
        }
    }
}

/// Holds the in-flight flag for the lifetime of one refresh.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Background-refreshed cache of expensive query results.
pub struct CachedQueryManager {
    entries: RwLock<BTreeMap<String, Arc<QueryEntry>>>,
    shared: Option<Arc<dyn SharedCache>>,
    config: QueryManagerConfig,
}

impl fmt::Debug for CachedQueryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedQueryManager")
            .field("paths", &self.paths())
            .field("shared", &self.shared.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl CachedQueryManager {
    /// Creates a manager with no shared tier.
    #[must_use]
    pub fn new(config: QueryManagerConfig) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            shared: None,
            config,
        }
    }

    /// Writes successful refreshes through to `shared` and reads from it
    /// before the first local refresh.
    #[must_use]
    pub fn with_shared_cache(mut self, shared: Arc<dyn SharedCache>) -> Self {
        self.shared = Some(shared);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> QueryManagerConfig {
        self.config
    }

    /// Registers (or replaces) the cached query for `path`. Does not fetch.
    ///
    /// Returns false, registering nothing, when the policy is disabled.
    pub fn register(
        &self,
        path: impl Into<String>,
        policy: CachePolicy,
        fetcher: Arc<dyn QueryFetcher>,
    ) -> bool {
        let path = path.into();
        if !policy.enabled {
            tracing::debug!(path = %path, "cache policy disabled; not registering");
            return false;
        }
        let entry = Arc::new(QueryEntry {
            path: path.clone(),
            policy,
            fetcher,
            in_flight: AtomicBool::new(false),
            state: RwLock::new(EntryState::default()),
        });
        self.write_entries().insert(path, entry);
        true
    }

    /// Removes the cached query for `path`.
    pub fn unregister(&self, path: &str) -> bool {
        self.write_entries().remove(path).is_some()
    }

    /// Returns true if `path` has a cached query.
    #[must_use]
    pub fn is_registered(&self, path: &str) -> bool {
        self.read_entries().contains_key(path)
    }

    /// Returns registered paths in order.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.read_entries().keys().cloned().collect()
    }

    /// Returns the number of registered queries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    /// Returns true if no query is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads the cached value for `path` without waiting on any refresh.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotRegistered`] for an unknown path.
    pub async fn get(&self, path: &str) -> Result<QueryLookup> {
        let entry = self.entry(path)?;

        let local = {
            let state = entry.read();
            state.value.clone().map(|value| {
                let expired = state
                    .loaded_at
                    .is_none_or(|loaded_at| loaded_at.elapsed() >= entry.policy.ttl());
                if expired || state.last_error.is_some() {
                    QueryLookup::Stale(value)
                } else {
                    QueryLookup::Fresh(value)
                }
            })
        };

        let lookup = match local {
            Some(lookup) => lookup,
            None => self.read_shared(&entry).await,
        };
        metrics::record_query_lookup(match lookup {
            QueryLookup::Fresh(_) => "fresh",
            QueryLookup::Stale(_) => "stale",
            QueryLookup::NotYetAvailable => "unavailable",
        });
        Ok(lookup)
    }

    /// Refreshes `path` now unless a refresh is already running.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotRegistered`] for an unknown path.
    pub async fn refresh(&self, path: &str) -> Result<RefreshOutcome> {
        let entry = self.entry(path)?;
        Ok(refresh_entry(entry, self.config.fetch_timeout, self.shared.clone()).await)
    }

    /// Refreshes every entry flagged for startup, concurrently.
    ///
    /// Failures are logged and reported as `false`; they never abort the batch.
    pub async fn refresh_all_startup(&self) -> BTreeMap<String, bool> {
        let entries: Vec<Arc<QueryEntry>> = self
            .read_entries()
            .values()
            .filter(|entry| entry.policy.refresh_on_startup)
            .cloned()
            .collect();

        let timeout = self.config.fetch_timeout;
        let outcomes = join_all(entries.into_iter().map(|entry| {
            let shared = self.shared.clone();
            async move {
                let path = entry.path.clone();
                let outcome = refresh_entry(entry, timeout, shared).await;
                (path, outcome.is_success())
            }
        }))
        .await;

        let results: BTreeMap<String, bool> = outcomes.into_iter().collect();
        let succeeded = results.values().filter(|ok| **ok).count();
        tracing::info!(
            total = results.len(),
            succeeded,
            failed = results.len() - succeeded,
            "startup cache refresh complete"
        );
        results
    }

    /// Runs one loop tick: spawns a refresh for every due entry and waits for
    /// them. Returns each attempted path with its outcome.
    pub async fn run_tick(&self) -> BTreeMap<String, RefreshOutcome> {
        let now = Instant::now();
        let due: Vec<Arc<QueryEntry>> = self
            .read_entries()
            .values()
            .filter(|entry| entry.is_due(now))
            .cloned()
            .collect();
        if due.is_empty() {
            return BTreeMap::new();
        }

        let timeout = self.config.fetch_timeout;
        let tasks: Vec<_> = due
            .into_iter()
            .map(|entry| {
                let path = entry.path.clone();
                let shared = self.shared.clone();
                (
                    path,
                    tokio::spawn(refresh_entry(entry, timeout, shared)),
                )
            })
            .collect();

        let mut outcomes = BTreeMap::new();
        for (path, task) in tasks {
            match task.await {
                Ok(outcome) => {
                    outcomes.insert(path, outcome);
                }
                Err(e) => {
                    tracing::error!(path = %path, error = %e, "refresh task panicked");
                    outcomes.insert(path, RefreshOutcome::Failed(e.to_string()));
                }
            }
        }
        outcomes
    }

    /// Runs the refresh loop until `shutdown` resolves.
    ///
    /// The first tick fires one full interval after the call; use
    /// [`CachedQueryManager::refresh_all_startup`] for the initial load.
    pub async fn run_refresh_loop<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.config.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await;
        tokio::pin!(shutdown);

        tracing::info!(
            tick_secs = self.config.tick.as_secs(),
            entries = self.len(),
            "cache refresh loop started"
        );
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = interval.tick() => {
                    let outcomes = self.run_tick().await;
                    if !outcomes.is_empty() {
                        tracing::debug!(refreshed = outcomes.len(), "cache refresh tick complete");
                    }
                }
            }
        }
        tracing::info!("cache refresh loop stopped");
    }

    /// Reports the state of every entry, ordered by path.
    #[must_use]
    pub fn status(&self) -> Vec<QueryStatus> {
        self.read_entries()
            .values()
            .map(|entry| entry.status())
            .collect()
    }

    fn entry(&self, path: &str) -> Result<Arc<QueryEntry>> {
        self.read_entries()
            .get(path)
            .cloned()
            .ok_or_else(|| CacheError::not_registered(path))
    }

    async fn read_shared(&self, entry: &QueryEntry) -> QueryLookup {
        let Some(shared) = &self.shared else {
            return QueryLookup::NotYetAvailable;
        };
        let bytes = match shared.get(&query_key(&entry.path)).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return QueryLookup::NotYetAvailable,
            Err(e) => {
                tracing::warn!(path = %entry.path, error = %e, "shared cache read failed");
                return QueryLookup::NotYetAvailable;
            }
        };
        match serde_json::from_slice::<CachedValue>(&bytes) {
            Ok(value) => {
                let age = Utc::now().signed_duration_since(value.refreshed_at);
                let ttl = chrono::Duration::from_std(entry.policy.ttl())
                    .unwrap_or(chrono::Duration::MAX);
                if age < ttl {
                    QueryLookup::Fresh(value)
                } else {
                    QueryLookup::Stale(value)
                }
            }
            Err(e) => {
                tracing::warn!(path = %entry.path, error = %e, "undecodable shared cache value");
                QueryLookup::NotYetAvailable
            }
        }
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<QueryEntry>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<QueryEntry>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn refresh_entry(
    entry: Arc<QueryEntry>,
    timeout: Duration,
    shared: Option<Arc<dyn SharedCache>>,
) -> RefreshOutcome {
    let Some(_guard) = InFlightGuard::acquire(&entry.in_flight) else {
        tracing::debug!(path = %entry.path, "refresh already in flight");
        metrics::record_refresh(RefreshOutcome::AlreadyInFlight.label());
        return RefreshOutcome::AlreadyInFlight;
    };

    let started = Instant::now();
    let fetched = tokio::time::timeout(timeout, entry.fetcher.fetch(&entry.path))
        .instrument(refresh_span(&entry.path))
        .await;
    let elapsed = started.elapsed();
    metrics::record_fetch_duration(elapsed);
    let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

    let outcome = match fetched {
        Ok(Ok(result)) => {
            let value = CachedValue {
                result,
                refreshed_at: Utc::now(),
            };
            {
                let mut state = entry.write();
                state.value = Some(value.clone());
                state.loaded_at = Some(Instant::now());
                state.last_error = None;
                state.refresh_count += 1;
            }
            tracing::info!(
                path = %entry.path,
                rows = value.result.row_count(),
                duration_ms,
                "cached query refreshed"
            );
            if let Some(shared) = shared {
                write_shared(shared.as_ref(), &entry, &value).await;
            }
            RefreshOutcome::Refreshed
        }
        Ok(Err(e)) => {
            tracing::warn!(path = %entry.path, error = %e, duration_ms, "cached query refresh failed");
            record_failure(&entry, e.to_string());
            RefreshOutcome::Failed(e.to_string())
        }
        Err(_) => {
            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            let error = CacheError::Timeout {
                path: entry.path.clone(),
                timeout_ms,
            };
            tracing::warn!(path = %entry.path, error = %error, "cached query refresh timed out");
            record_failure(&entry, error.to_string());
            RefreshOutcome::TimedOut
        }
    };
    metrics::record_refresh(outcome.label());
    outcome
}

fn record_failure(entry: &QueryEntry, message: String) {
    let mut state = entry.write();
    state.last_error = Some(message);
    state.failure_count += 1;
}

async fn write_shared(shared: &dyn SharedCache, entry: &QueryEntry, value: &CachedValue) {
    let bytes = match serde_json::to_vec(value) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %entry.path, error = %e, "failed to encode cached value");
            return;
        }
    };
    if let Err(e) = shared
        .set(&query_key(&entry.path), bytes, entry.policy.ttl())
        .await
    {
        tracing::warn!(path = %entry.path, error = %e, "shared cache write failed");
    }
}
