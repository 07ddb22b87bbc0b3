//! # moniker-service
//!
//! The transport-agnostic boundary of the moniker resolver.
//!
//! This crate provides:
//!
//! - **Resolution Service**: resolve, fetch, describe, list, search, and lineage over the catalog
//! - **Governance Operations**: token-gated submission, review, and node edits
//! - **Source Adapters**: A trait and registry for fetching rows from source systems
//! - **Write-Token Gate**: Constant-time checks of the submit and approve secrets
//! - **Error Taxonomy**: Stable, structured errors for every caller-visible failure
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use moniker_catalog::{CatalogNode, CatalogRegistry, SourceBinding, SourceType};
//! use moniker_service::prelude::*;
//!
//! let catalog = Arc::new(CatalogRegistry::new());
//! catalog
//!     .register(
//!         CatalogNode::new("prices.equity")
//!             .with_binding(SourceBinding::new(SourceType::Snowflake)),
//!     )
//!     .unwrap();
//!
//! let service = ResolutionService::new(catalog, ServiceConfig::default());
//! let result = service
//!     .resolve("prices.equity/AAPL", &CallerIdentity::default())
//!     .unwrap();
//! assert_eq!(result.binding_path, "prices.equity");
//! assert_eq!(result.filters, vec!["AAPL"]);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod adapter;
pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod metrics;
pub mod results;
pub mod service;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::adapter::{AdapterRegistry, FetchRequest, SourceAdapter, StaticAdapter};
    pub use crate::auth::{Privilege, WriteTokens};
    pub use crate::error::{Result, ServiceError};
    pub use crate::results::{CallerIdentity, FetchResult, FetchSource, ResolveResult};
    pub use crate::service::{ResolutionService, ServiceConfig};
}

pub use adapter::{AdapterError, AdapterRegistry, FetchRequest, SourceAdapter, StaticAdapter};
pub use auth::{Privilege, WriteTokens};
pub use bootstrap::{register_cached_queries, sync_cached_query};
pub use error::{ErrorPayload, Result, ServiceError};
pub use results::{
    CallerIdentity, DescribeResult, FetchResult, FetchSource, LineageLevel, LineageResult,
    ListResult, ResolveResult,
};
pub use service::{ResolutionService, ServiceConfig};
