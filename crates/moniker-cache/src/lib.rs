//! # moniker-cache
//!
//! Caching layers beneath moniker resolution.
//!
//! This crate provides:
//!
//! - **Local Result Cache**: A process-local, size- and TTL-bounded LRU of resolution results
//! - **Cached Query Manager**: Background-refreshed, single-flight cache of expensive query results
//! - **Shared Tier**: A trait for an external cache that refreshed values are written through to
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use moniker_cache::prelude::*;
//!
//! let cache = LocalResultCache::new(LocalCacheConfig {
//!     max_entries: 100,
//!     default_ttl: Duration::from_secs(60),
//! });
//! cache.insert("prices.equity/AAPL", 42_u32);
//! assert_eq!(cache.get("prices.equity/AAPL"), Some(42));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod local;
pub mod metrics;
pub mod query;
pub mod result;
pub mod shared;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{CacheError, Result};
    pub use crate::local::{LocalCacheConfig, LocalResultCache};
    pub use crate::query::{
        CachedQueryManager, CachedValue, QueryFetcher, QueryLookup, QueryManagerConfig,
        RefreshOutcome, query_fetcher,
    };
    pub use crate::result::QueryResult;
    pub use crate::shared::{MemorySharedCache, SharedCache};
}

pub use error::{CacheError, Result};
pub use local::{LocalCacheConfig, LocalResultCache};
pub use query::{
    CachedQueryManager, CachedValue, FnFetcher, QueryFetcher, QueryLookup, QueryManagerConfig,
    QueryStatus, RefreshOutcome, query_fetcher,
};
pub use result::QueryResult;
pub use shared::{MemorySharedCache, SharedCache};
