//! Per-node query cache policy.
//!
//! Declared on a source binding and consumed by the cached query manager.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default time-to-live for cached query results.
pub const DEFAULT_TTL_SECONDS: u64 = 300;

/// Caching configuration for an expensive query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Whether the query result is cached and refreshed in the background.
    #[serde(default)]
    pub enabled: bool,
    /// Age after which a cached value is reported as stale.
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Refresh cadence; `0` means "refresh when the TTL lapses".
    #[serde(default)]
    pub refresh_interval_seconds: u64,
    /// Whether the startup batch fetches this entry.
    #[serde(default = "default_true")]
    pub refresh_on_startup: bool,
}

fn default_ttl() -> u64 {
    DEFAULT_TTL_SECONDS
}

fn default_true() -> bool {
    true
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            refresh_interval_seconds: 0,
            refresh_on_startup: true,
        }
    }
}

impl CachePolicy {
    /// Creates an enabled policy with the given TTL and refresh cadence.
    #[must_use]
    pub fn enabled(ttl_seconds: u64, refresh_interval_seconds: u64) -> Self {
        Self {
            enabled: true,
            ttl_seconds,
            refresh_interval_seconds,
            refresh_on_startup: true,
        }
    }

    /// Returns the TTL as a duration.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Returns the effective refresh cadence, falling back to the TTL.
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        if self.refresh_interval_seconds == 0 {
            Duration::from_secs(self.ttl_seconds)
        } else {
            Duration::from_secs(self.refresh_interval_seconds)
        }
    }
}
