//! Query-pattern access policy.
//!
//! A policy vetoes resolve calls whose filters would select too much data.
//! Filter positions the caller omits mean "all values"; each omitted declared
//! position multiplies the estimated row count by its cardinality.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

/// Base row count used when a policy does not declare one.
pub const DEFAULT_BASE_ROW_COUNT: u64 = 100;

/// Cardinality assumed for an omitted position with no declared multiplier.
pub const DEFAULT_CARDINALITY: u64 = 100;

/// Access policy attached to a catalog node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Filter positions that must be supplied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_segments: Vec<usize>,
    /// Minimum number of supplied filters.
    #[serde(default)]
    pub min_filters: usize,
    /// Case-insensitive regexes over the joined filter path that are refused.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_patterns: Vec<String>,
    /// Estimates above this are allowed with a warning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rows_warn: Option<u64>,
    /// Estimates above this are refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rows_block: Option<u64>,
    /// Cardinality of each filter position.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cardinality_multipliers: Vec<u64>,
    /// Rows returned when every position is supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_row_count: Option<u64>,
    /// Message that replaces the generated denial text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denial_message: Option<String>,
}

/// Outcome of evaluating a policy against a filter list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    /// Whether the query may proceed.
    pub allowed: bool,
    /// Denial reason when not allowed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Large-query warning when allowed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Estimated rows the query would return.
    pub estimated_rows: u64,
}

impl AccessPolicy {
    /// Checks that every blocked pattern compiles.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the first invalid pattern.
    pub fn validate(&self) -> Result<()> {
        self.compiled_patterns().map(drop)
    }

    /// Compiles the blocked patterns, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the first invalid pattern.
    pub fn compiled_patterns(&self) -> Result<Vec<Regex>> {
        self.blocked_patterns
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        CatalogError::validation(format!(
                            "invalid blocked pattern '{pattern}': {e}"
                        ))
                    })
            })
            .collect()
    }

    /// Estimates the rows selected by `filters`.
    ///
    /// `declared_positions` is the number of filter positions the binding
    /// names; the policy's own multipliers extend it.
    #[must_use]
    pub fn estimate_rows(&self, filters: &[String], declared_positions: usize) -> u64 {
        let positions = declared_positions.max(self.cardinality_multipliers.len());
        let base = self.base_row_count.unwrap_or(DEFAULT_BASE_ROW_COUNT);
        (filters.len()..positions).fold(base, |rows, idx| {
            let multiplier = self
                .cardinality_multipliers
                .get(idx)
                .copied()
                .unwrap_or(DEFAULT_CARDINALITY);
            rows.saturating_mul(multiplier)
        })
    }

    /// Evaluates the policy.
    ///
    /// A policy whose blocked patterns do not compile refuses every query.
    #[must_use]
    pub fn evaluate(&self, filters: &[String], declared_positions: usize) -> AccessDecision {
        let estimated_rows = self.estimate_rows(filters, declared_positions);
        let joined = filters.join("/");
        let deny = |message: String| AccessDecision {
            allowed: false,
            message: Some(message),
            warning: None,
            estimated_rows,
        };

        let patterns = match self.compiled_patterns() {
            Ok(patterns) => patterns,
            Err(e) => {
                tracing::warn!(error = %e, "access policy has an invalid blocked pattern");
                return deny(self.denial_message.clone().unwrap_or_else(|| {
                    "access policy is misconfigured; query refused".to_string()
                }));
            }
        };
        if patterns.iter().any(|re| re.is_match(&joined)) {
            return deny(self.denial_message.clone().unwrap_or_else(|| {
                format!("query pattern '{joined}' is blocked by access policy")
            }));
        }

        if let Some(idx) = self
            .required_segments
            .iter()
            .copied()
            .find(|idx| *idx >= filters.len())
        {
            return deny(format!(
                "access policy requires filter segment {idx} to be specified"
            ));
        }

        if filters.len() < self.min_filters {
            return deny(format!(
                "access policy requires at least {} filters, but only {} provided",
                self.min_filters,
                filters.len()
            ));
        }

        if let Some(limit) = self.max_rows_block.filter(|limit| estimated_rows > *limit) {
            return deny(self.denial_message.clone().unwrap_or_else(|| {
                format!(
                    "query would return ~{estimated_rows} rows, exceeding limit of {limit}; \
                     add more specific filters"
                )
            }));
        }

        let warning = self
            .max_rows_warn
            .filter(|limit| estimated_rows > *limit)
            .map(|_| format!("large query: estimated {estimated_rows} rows"));

        AccessDecision {
            allowed: true,
            message: None,
            warning,
            estimated_rows,
        }
    }
}
