//! Resolution service metrics.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};

// ============================================================================
// Metric Names
// ============================================================================

/// Resolve calls, labelled by outcome (`ok`, `cached`, error code).
pub const RESOLVE_TOTAL: &str = "moniker_resolve_total";

/// Resolve latency in seconds.
pub const RESOLVE_DURATION: &str = "moniker_resolve_duration_seconds";

/// Fetch calls, labelled by the layer that served them.
pub const FETCH_TOTAL: &str = "moniker_fetch_total";

/// Governance write attempts, labelled by operation and outcome.
pub const GOVERNANCE_WRITES: &str = "moniker_governance_writes_total";

// ============================================================================
// Metric Registration
// ============================================================================

/// Registers all service metric descriptions.
pub fn register_metrics() {
    describe_counter!(RESOLVE_TOTAL, "Total resolve calls by outcome");
    describe_histogram!(RESOLVE_DURATION, "Resolve latency in seconds");
    describe_counter!(FETCH_TOTAL, "Total fetch calls by serving layer");
    describe_counter!(GOVERNANCE_WRITES, "Total governance write attempts");
}

// ============================================================================
// Metric Recording
// ============================================================================

/// Records one resolve call.
pub fn record_resolve(outcome: &'static str, duration: Duration) {
    counter!(RESOLVE_TOTAL, "outcome" => outcome).increment(1);
    histogram!(RESOLVE_DURATION).record(duration.as_secs_f64());
}

/// Records one fetch call.
pub fn record_fetch(source: &'static str) {
    counter!(FETCH_TOTAL, "source" => source).increment(1);
}

/// Records one governance write attempt.
pub fn record_write(operation: &'static str, outcome: &'static str) {
    counter!(GOVERNANCE_WRITES, "operation" => operation, "outcome" => outcome).increment(1);
}
