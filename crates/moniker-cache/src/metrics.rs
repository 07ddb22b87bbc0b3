//! Cache metrics.
//!
//! Hit/miss/eviction counters for the local result cache, plus refresh
//! outcomes and fetch latency for the cached query manager.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};

// ============================================================================
// Metric Names
// ============================================================================

/// Local cache lookups, labelled by result (`hit`, `miss`, `expired`).
pub const LOCAL_CACHE_LOOKUPS: &str = "moniker_local_cache_lookups_total";

/// Local cache evictions, labelled by reason (`expired`, `capacity`).
pub const LOCAL_CACHE_EVICTIONS: &str = "moniker_local_cache_evictions_total";

/// Cached query refreshes, labelled by outcome.
pub const QUERY_REFRESHES: &str = "moniker_query_refreshes_total";

/// Cached query fetch duration in seconds.
pub const QUERY_FETCH_DURATION: &str = "moniker_query_fetch_duration_seconds";

/// Cached query reads, labelled by result (`fresh`, `stale`, `unavailable`).
pub const QUERY_LOOKUPS: &str = "moniker_query_lookups_total";

// ============================================================================
// Metric Registration
// ============================================================================

/// Registers all cache metric descriptions.
///
/// Call this once at application startup after initializing the metrics recorder.
pub fn register_metrics() {
    describe_counter!(LOCAL_CACHE_LOOKUPS, "Total local result cache lookups");
    describe_counter!(LOCAL_CACHE_EVICTIONS, "Total local result cache evictions");
    describe_counter!(QUERY_REFRESHES, "Total cached query refresh attempts");
    describe_histogram!(
        QUERY_FETCH_DURATION,
        "Duration of cached query fetches in seconds"
    );
    describe_counter!(QUERY_LOOKUPS, "Total cached query reads");
}

// ============================================================================
// Metric Recording
// ============================================================================

/// Records a local cache lookup.
pub fn record_lookup(result: &'static str) {
    counter!(LOCAL_CACHE_LOOKUPS, "result" => result).increment(1);
}

/// Records local cache evictions.
pub fn record_evictions(reason: &'static str, count: usize) {
    if count > 0 {
        counter!(LOCAL_CACHE_EVICTIONS, "reason" => reason).increment(u64::try_from(count).unwrap_or(u64::MAX));
    }
}

/// Records a refresh outcome.
pub fn record_refresh(outcome: &'static str) {
    counter!(QUERY_REFRESHES, "outcome" => outcome).increment(1);
}

/// Records a fetch duration.
pub fn record_fetch_duration(duration: Duration) {
    histogram!(QUERY_FETCH_DURATION).record(duration.as_secs_f64());
}

/// Records a cached query read.
pub fn record_query_lookup(result: &'static str) {
    counter!(QUERY_LOOKUPS, "result" => result).increment(1);
}
