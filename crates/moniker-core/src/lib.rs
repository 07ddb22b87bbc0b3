//! # moniker-core
//!
//! Shared primitives for the moniker resolver.
//!
//! This crate provides the leaf types every other moniker crate builds on:
//!
//! - **Moniker Grammar**: Parsing and canonical rendering of moniker strings
//! - **Path Hierarchy**: Parent/ancestor/child relations over `.`- and `/`-separated paths
//! - **Cache Policy**: Per-node query caching configuration shared by catalog and cache
//! - **Identifiers**: Strongly-typed, time-sortable request identifiers
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialization and span helpers
//!
//! ## Example
//!
//! ```rust
//! use moniker_core::prelude::*;
//!
//! let moniker = Moniker::parse("prices.equity/AAPL@latest").unwrap();
//! assert_eq!(moniker.path(), "prices.equity/AAPL");
//! assert_eq!(parent_path("prices.equity/AAPL"), Some("prices.equity"));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod cache_policy;
pub mod error;
pub mod id;
pub mod moniker;
pub mod observability;
pub mod path;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use moniker_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cache_policy::CachePolicy;
    pub use crate::error::{Error, Result};
    pub use crate::id::RequestId;
    pub use crate::moniker::{Moniker, VersionKind};
    pub use crate::path::{ancestor_paths, is_direct_child, parent_path, top_level};
}

pub use cache_policy::CachePolicy;
pub use error::{Error, Result};
pub use id::RequestId;
pub use moniker::{Moniker, VersionKind};
