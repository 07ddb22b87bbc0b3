//! Catalog metrics.
//!
//! Counters for governance mutations and lookups. These complement the
//! structured logging emitted by the registry and workflow.

use metrics::{counter, describe_counter, describe_gauge, gauge};

// ============================================================================
// Metric Names
// ============================================================================

/// Governance mutation counter, labelled by action.
pub const GOVERNANCE_MUTATIONS: &str = "moniker_governance_mutations_total";

/// Workflow rejection counter (conflicts, bad transitions), labelled by reason.
pub const GOVERNANCE_REJECTIONS: &str = "moniker_governance_rejections_total";

/// Number of nodes currently registered.
pub const CATALOG_NODES: &str = "moniker_catalog_nodes";

/// Catalog document load counter, labelled by outcome.
pub const CATALOG_LOADS: &str = "moniker_catalog_loads_total";

// ============================================================================
// Metric Registration
// ============================================================================

/// Registers all catalog metric descriptions.
///
/// Call this once at application startup after initializing the metrics recorder.
pub fn register_metrics() {
    describe_counter!(GOVERNANCE_MUTATIONS, "Total accepted governance mutations");
    describe_counter!(
        GOVERNANCE_REJECTIONS,
        "Total governance operations rejected by workflow guards"
    );
    describe_gauge!(CATALOG_NODES, "Number of registered catalog nodes");
    describe_counter!(CATALOG_LOADS, "Total catalog document loads");
}

// ============================================================================
// Metric Recording
// ============================================================================

/// Records an accepted governance mutation.
pub fn record_mutation(action: &str) {
    counter!(GOVERNANCE_MUTATIONS, "action" => action.to_string()).increment(1);
}

/// Records a rejected governance operation.
pub fn record_rejection(reason: &'static str) {
    counter!(GOVERNANCE_REJECTIONS, "reason" => reason).increment(1);
}

/// Records the current node count.
#[allow(clippy::cast_precision_loss)]
pub fn record_node_count(count: usize) {
    gauge!(CATALOG_NODES).set(count as f64);
}

/// Records a catalog document load.
pub fn record_load(outcome: &'static str) {
    counter!(CATALOG_LOADS, "outcome" => outcome).increment(1);
}
